use std::sync::Arc;

use depot_index::{FileIndex, IndexError};
use depot_protocol::{
    parse_file_id, validate_request, Limits, Message, OpCode, ProtocolError, ResultCode,
};
use depot_store::BlobStore;

use crate::error::{ServerError, ServerResult};

/// Per-request orchestrator: validates a decoded request, resolves its
/// target resource, executes PUT/GET/DELETE against the blob store and
/// the metadata index, and builds the response.
///
/// Each session owns one `FileService` over shared store handles; the
/// service itself is stateless between requests. `process` is total:
/// every decoded request yields exactly one response, and no internal
/// error escapes as a crash of the connection.
pub struct FileService {
    index: Arc<dyn FileIndex>,
    blobs: Arc<BlobStore>,
    limits: Limits,
}

impl FileService {
    pub fn new(index: Arc<dyn FileIndex>, blobs: Arc<BlobStore>, limits: Limits) -> Self {
        Self {
            index,
            blobs,
            limits,
        }
    }

    /// Process one request to completion.
    pub async fn process(&self, request: Message) -> Message {
        if let Err(e) = validate_request(&request, &self.limits) {
            tracing::info!(error = %e, "invalid request");
            return Message::error_response(ResultCode::BadRequest, format!("invalid request: {e}"));
        }

        match self.execute(&request).await {
            Ok(response) => response,
            Err(err) => self.error_to_response(err),
        }
    }

    async fn execute(&self, request: &Message) -> ServerResult<Message> {
        let op = request.op_code().ok_or_else(|| {
            ProtocolError::Validation(format!("unknown operation code: {}", request.code))
        })?;
        tracing::debug!(%op, "processing request");

        match op {
            OpCode::Put => {
                let name = self.resolve_put_name(request).await?;
                self.put(&name, &request.body).await
            }
            OpCode::Get => {
                let (id, name) = self.resolve(request).await?;
                self.get(id, &name).await
            }
            OpCode::Delete => {
                let (id, name) = self.resolve(request).await?;
                self.delete(id, &name).await
            }
        }
    }

    /// Resolve the target of a GET or DELETE to a live `(id, name)` pair.
    /// `File-Name` wins when both selectors are present.
    async fn resolve(&self, request: &Message) -> ServerResult<(u64, String)> {
        if let Some(name) = request.file_name() {
            let id = self
                .index
                .id_by_name(name)
                .await?
                .ok_or_else(|| ServerError::NotFound(format!("file not found: {name}")))?;
            Ok((id, name.to_string()))
        } else {
            let raw = request.id_header().unwrap_or_default();
            let id = parse_file_id(raw)?;
            let name = self
                .index
                .name_by_id(id)
                .await?
                .ok_or_else(|| ServerError::NotFound(format!("file not found for ID: {id}")))?;
            Ok((id, name))
        }
    }

    /// Resolve the name a PUT stores under. A fresh name is the happy
    /// path here, not a resolution failure; only an ID-only PUT whose id
    /// is unknown fails to resolve.
    async fn resolve_put_name(&self, request: &Message) -> ServerResult<String> {
        if let Some(name) = request.file_name() {
            return Ok(name.to_string());
        }
        let raw = request.id_header().unwrap_or_default();
        let id = parse_file_id(raw)?;
        self.index
            .name_by_id(id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("file not found for ID: {id}")))
    }

    async fn put(&self, name: &str, content: &[u8]) -> ServerResult<Message> {
        if self.index.exists_by_name(name).await? {
            tracing::warn!(name, "attempt to overwrite existing file");
            return Ok(Message::error_response(
                ResultCode::BadRequest,
                format!("file already exists: {name}"),
            ));
        }

        // Blob first, record second. A crash between the two leaves an
        // unreferenced blob, which readers can never see.
        self.blobs.save(name, content).await?;

        let id = match self.index.insert(name).await {
            Ok(id) => id,
            Err(IndexError::Duplicate(_)) => {
                // Lost a same-name race after the existence check. The
                // winner's record stays valid, so the blob must not be
                // cleaned up. The per-name lock covers each save
                // individually, not save-plus-insert, so the surviving
                // bytes are whichever save ran last; the winner's record
                // may point at this request's content.
                tracing::warn!(name, "concurrent PUT lost the insert race");
                return Ok(Message::error_response(
                    ResultCode::BadRequest,
                    format!("file already exists: {name}"),
                ));
            }
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete(name).await {
                    tracing::error!(name, error = %cleanup, "failed to clean up blob after index error");
                }
                return Err(e.into());
            }
        };

        tracing::info!(name, id, bytes = content.len(), "file stored");
        Ok(Message::ok_response(id, name))
    }

    async fn get(&self, id: u64, name: &str) -> ServerResult<Message> {
        match self.blobs.read(name).await? {
            Some(bytes) => {
                tracing::info!(name, id, bytes = bytes.len(), "file retrieved");
                Ok(Message::ok_get_response(id, name, bytes))
            }
            None => {
                // A live record without a blob: the expected content is
                // absent, so this is NOT_FOUND rather than a server fault.
                tracing::warn!(name, id, "file content missing despite live record");
                Ok(Message::error_response(
                    ResultCode::NotFound,
                    format!("file content not found: {name}"),
                ))
            }
        }
    }

    async fn delete(&self, id: u64, name: &str) -> ServerResult<Message> {
        let prior = self.blobs.delete(name).await?;

        match self.index.remove_by_id(id).await {
            Ok(_) => {
                tracing::info!(name, id, "file deleted");
                Ok(Message::ok_response(id, name))
            }
            Err(e) => {
                if let Some(bytes) = prior {
                    if let Err(restore) = self.blobs.save(name, &bytes).await {
                        tracing::error!(name, error = %restore, "failed to restore blob after index error");
                    }
                }
                Err(e.into())
            }
        }
    }

    fn error_to_response(&self, err: ServerError) -> Message {
        match err {
            ServerError::Protocol(e @ ProtocolError::Validation(_)) => {
                tracing::info!(error = %e, "invalid request");
                Message::error_response(ResultCode::BadRequest, format!("invalid request: {e}"))
            }
            ServerError::NotFound(reason) => {
                tracing::warn!(reason, "resource not found");
                Message::error_response(ResultCode::NotFound, reason)
            }
            ServerError::Store(e) => {
                tracing::error!(error = %e, "file system error");
                Message::error_response(ResultCode::ServerError, format!("file system error: {e}"))
            }
            ServerError::Index(e) => {
                tracing::error!(error = %e, "index error");
                Message::error_response(ResultCode::ServerError, format!("index error: {e}"))
            }
            other => {
                tracing::error!(error = %other, "unexpected error");
                Message::error_response(ResultCode::ServerError, format!("unexpected error: {other}"))
            }
        }
    }
}

impl std::fmt::Debug for FileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileService")
            .field("limits", &self.limits)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use async_trait::async_trait;
    use depot_index::{FileRecord, IndexResult, MemoryFileIndex};
    use depot_protocol::header;
    use tempfile::tempdir;

    fn service_with(
        dir: &tempfile::TempDir,
        index: Arc<dyn FileIndex>,
    ) -> (FileService, Arc<BlobStore>) {
        let blobs = Arc::new(BlobStore::new(dir.path().join("blobs")));
        let service = FileService::new(index, Arc::clone(&blobs), Limits::default());
        (service, blobs)
    }

    fn service(dir: &tempfile::TempDir) -> FileService {
        service_with(dir, Arc::new(MemoryFileIndex::new())).0
    }

    /// Delegating index that fails the next insert or remove on demand.
    struct FlakyIndex {
        inner: MemoryFileIndex,
        fail_insert: AtomicBool,
        fail_remove: AtomicBool,
    }

    impl FlakyIndex {
        fn new() -> Self {
            Self {
                inner: MemoryFileIndex::new(),
                fail_insert: AtomicBool::new(false),
                fail_remove: AtomicBool::new(false),
            }
        }

        fn injected() -> IndexError {
            IndexError::Io(std::io::Error::other("injected index failure"))
        }
    }

    #[async_trait]
    impl FileIndex for FlakyIndex {
        async fn insert(&self, name: &str) -> IndexResult<u64> {
            if self.fail_insert.swap(false, Ordering::SeqCst) {
                return Err(Self::injected());
            }
            self.inner.insert(name).await
        }

        async fn remove_by_id(&self, id: u64) -> IndexResult<Option<FileRecord>> {
            if self.fail_remove.swap(false, Ordering::SeqCst) {
                return Err(Self::injected());
            }
            self.inner.remove_by_id(id).await
        }

        async fn name_by_id(&self, id: u64) -> IndexResult<Option<String>> {
            self.inner.name_by_id(id).await
        }

        async fn id_by_name(&self, name: &str) -> IndexResult<Option<u64>> {
            self.inner.id_by_name(name).await
        }
    }

    fn assert_code(response: &Message, code: ResultCode) {
        assert_eq!(response.result_code(), Some(code), "{response:?}");
    }

    #[tokio::test]
    async fn put_get_delete_scenario() {
        let dir = tempdir().unwrap();
        let service = service(&dir);
        let body = vec![0x5A; 1024];

        let response = service
            .process(Message::put_request("report.pdf", body.clone()))
            .await;
        assert_code(&response, ResultCode::Success);
        assert_eq!(response.id_header(), Some("1"));
        assert_eq!(response.file_name(), Some("report.pdf"));

        let response = service.process(Message::get_request_by_id(1)).await;
        assert_code(&response, ResultCode::Success);
        assert_eq!(response.body, body);

        let response = service.process(Message::delete_request("report.pdf")).await;
        assert_code(&response, ResultCode::Success);

        let response = service.process(Message::get_request_by_id(1)).await;
        assert_code(&response, ResultCode::NotFound);
    }

    #[tokio::test]
    async fn put_is_not_idempotent() {
        let dir = tempdir().unwrap();
        let service = service(&dir);

        let first = service
            .process(Message::put_request("a.txt", b"X".to_vec()))
            .await;
        assert_code(&first, ResultCode::Success);

        let second = service
            .process(Message::put_request("a.txt", b"Y".to_vec()))
            .await;
        assert_code(&second, ResultCode::BadRequest);

        let get = service.process(Message::get_request("a.txt")).await;
        assert_eq!(get.body, b"X");
    }

    #[tokio::test]
    async fn get_unknown_name_is_not_found() {
        let dir = tempdir().unwrap();
        let service = service(&dir);
        let response = service.process(Message::get_request("nope.txt")).await;
        assert_code(&response, ResultCode::NotFound);
        assert!(response.header(header::MESSAGE).is_some());
    }

    #[tokio::test]
    async fn delete_unknown_name_is_not_found_and_changes_nothing() {
        let dir = tempdir().unwrap();
        let service = service(&dir);

        service
            .process(Message::put_request("keep.txt", b"keep".to_vec()))
            .await;
        let response = service.process(Message::delete_request("nope.txt")).await;
        assert_code(&response, ResultCode::NotFound);

        let get = service.process(Message::get_request("keep.txt")).await;
        assert_code(&get, ResultCode::Success);
    }

    #[tokio::test]
    async fn delete_by_unknown_id_is_not_found() {
        let dir = tempdir().unwrap();
        let service = service(&dir);
        let response = service.process(Message::delete_request_by_id(99)).await;
        assert_code(&response, ResultCode::NotFound);
    }

    #[tokio::test]
    async fn invalid_filename_is_bad_request() {
        let dir = tempdir().unwrap();
        let service = service(&dir);
        for name in ["../etc/passwd", "a/b.txt", "bad name.txt", ""] {
            let response = service
                .process(Message::put_request(name, b"x".to_vec()))
                .await;
            assert_code(&response, ResultCode::BadRequest);
        }
    }

    #[tokio::test]
    async fn missing_selector_is_bad_request() {
        let dir = tempdir().unwrap();
        let service = service(&dir);
        let request = Message::new(depot_protocol::MessageKind::Request, OpCode::Get.code());
        let response = service.process(request).await;
        assert_code(&response, ResultCode::BadRequest);
    }

    #[tokio::test]
    async fn non_numeric_id_is_bad_request() {
        let dir = tempdir().unwrap();
        let service = service(&dir);
        let mut request = Message::new(depot_protocol::MessageKind::Request, OpCode::Get.code());
        request.headers.insert(header::ID.into(), "abc".into());
        let response = service.process(request).await;
        assert_code(&response, ResultCode::BadRequest);
    }

    #[tokio::test]
    async fn file_name_wins_when_both_selectors_present() {
        let dir = tempdir().unwrap();
        let service = service(&dir);
        service
            .process(Message::put_request("a.txt", b"content-a".to_vec()))
            .await;
        service
            .process(Message::put_request("b.txt", b"content-b".to_vec()))
            .await;

        // File-Name says a.txt, ID says b.txt's record.
        let mut request = Message::get_request("a.txt");
        request.headers.insert(header::ID.into(), "2".into());
        let response = service.process(request).await;
        assert_code(&response, ResultCode::Success);
        assert_eq!(response.body, b"content-a");
        assert_eq!(response.id_header(), Some("1"));
    }

    #[tokio::test]
    async fn live_record_with_missing_blob_is_not_found() {
        let dir = tempdir().unwrap();
        let index: Arc<dyn FileIndex> = Arc::new(MemoryFileIndex::new());
        let (service, _blobs) = service_with(&dir, Arc::clone(&index));

        // Record exists, blob was never written.
        index.insert("ghost.txt").await.unwrap();
        let response = service.process(Message::get_request("ghost.txt")).await;
        assert_code(&response, ResultCode::NotFound);
    }

    #[tokio::test]
    async fn failed_insert_rolls_back_the_blob() {
        let dir = tempdir().unwrap();
        let flaky = Arc::new(FlakyIndex::new());
        let index: Arc<dyn FileIndex> = Arc::clone(&flaky) as Arc<dyn FileIndex>;
        let (service, blobs) = service_with(&dir, index);

        flaky.fail_insert.store(true, Ordering::SeqCst);
        let response = service
            .process(Message::put_request("a.txt", b"doomed".to_vec()))
            .await;
        assert_code(&response, ResultCode::ServerError);

        // Compensation removed the blob; the name behaves as never PUT.
        assert!(blobs.read("a.txt").await.unwrap().is_none());
        let get = service.process(Message::get_request("a.txt")).await;
        assert_code(&get, ResultCode::NotFound);
        let retry = service
            .process(Message::put_request("a.txt", b"fine now".to_vec()))
            .await;
        assert_code(&retry, ResultCode::Success);
    }

    #[tokio::test]
    async fn failed_remove_restores_the_blob() {
        let dir = tempdir().unwrap();
        let flaky = Arc::new(FlakyIndex::new());
        let index: Arc<dyn FileIndex> = Arc::clone(&flaky) as Arc<dyn FileIndex>;
        let (service, blobs) = service_with(&dir, index);

        let response = service
            .process(Message::put_request("a.txt", b"precious".to_vec()))
            .await;
        assert_code(&response, ResultCode::Success);

        flaky.fail_remove.store(true, Ordering::SeqCst);
        let response = service.process(Message::delete_request("a.txt")).await;
        assert_code(&response, ResultCode::ServerError);

        // The blob is back and the record still resolves.
        assert_eq!(blobs.read("a.txt").await.unwrap().unwrap(), b"precious");
        let get = service.process(Message::get_request("a.txt")).await;
        assert_code(&get, ResultCode::Success);
        assert_eq!(get.body, b"precious");
    }

    #[tokio::test]
    async fn delete_with_missing_blob_still_removes_the_record() {
        let dir = tempdir().unwrap();
        let index: Arc<dyn FileIndex> = Arc::new(MemoryFileIndex::new());
        let (service, _blobs) = service_with(&dir, Arc::clone(&index));

        index.insert("ghost.txt").await.unwrap();
        let response = service.process(Message::delete_request("ghost.txt")).await;
        assert_code(&response, ResultCode::Success);
        assert!(!index.exists_by_name("ghost.txt").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_puts_to_distinct_names_all_succeed() {
        let dir = tempdir().unwrap();
        let service = Arc::new(service(&dir));

        let mut handles = Vec::new();
        for i in 0..8 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                let name = format!("file-{i}.bin");
                service
                    .process(Message::put_request(name, format!("content-{i}").into_bytes()))
                    .await
            }));
        }
        for handle in handles {
            assert_code(&handle.await.unwrap(), ResultCode::Success);
        }

        for i in 0..8 {
            let get = service
                .process(Message::get_request(format!("file-{i}.bin")))
                .await;
            assert_code(&get, ResultCode::Success);
            assert_eq!(get.body, format!("content-{i}").into_bytes());
        }
    }

    #[tokio::test]
    async fn concurrent_same_name_puts_yield_exactly_one_success() {
        let dir = tempdir().unwrap();
        let service = Arc::new(service(&dir));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service
                    .process(Message::put_request("contested.txt", b"same bytes".to_vec()))
                    .await
            }));
        }

        let mut successes = 0;
        let mut bad_requests = 0;
        for handle in handles {
            match handle.await.unwrap().result_code() {
                Some(ResultCode::Success) => successes += 1,
                Some(ResultCode::BadRequest) => bad_requests += 1,
                other => panic!("unexpected result: {other:?}"),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(bad_requests, 7);

        let get = service.process(Message::get_request("contested.txt")).await;
        assert_code(&get, ResultCode::Success);
        assert_eq!(get.body, b"same bytes");
    }

    #[tokio::test]
    async fn responses_satisfy_the_transmit_shape() {
        let dir = tempdir().unwrap();
        let service = service(&dir);

        let ok = service
            .process(Message::put_request("a.txt", b"x".to_vec()))
            .await;
        depot_protocol::validate_response(&ok).unwrap();

        let err = service.process(Message::get_request("nope.txt")).await;
        depot_protocol::validate_response(&err).unwrap();
    }
}
