//! # Remote Importer
//!
//! Serves kinds owned by the control domain from a regional deployment. The
//! request is encoded as JSON, carried by a `ControlPlaneTransport`, and the
//! control side answers with an encoded `ImportResponse`.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{
    ImportOk, ImportRequest, ImportResponse, InstanceId, RpcImportError, RpcImportErrorKind,
};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::application::ImporterRegistry;
use crate::domain::TransportError;
use crate::ports::{ControlPlaneTransport, Importer};

/// Method name of the import call.
pub const IMPORT_METHOD: &str = "import_by_model";

/// Importer that forwards every batch over a transport.
pub struct RemoteImporter {
    transport: Arc<dyn ControlPlaneTransport>,
}

impl RemoteImporter {
    /// Create an importer over `transport`.
    pub fn new(transport: Arc<dyn ControlPlaneTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Importer for RemoteImporter {
    async fn import_batch(&self, request: ImportRequest) -> Result<ImportOk, RpcImportError> {
        let on = InstanceId::new(request.kind.clone(), Some(request.min_ordinal));

        let payload = serde_json::to_vec(&request).map_err(|e| {
            RpcImportError::new(RpcImportErrorKind::DeserializationFailed, on.clone(), e.to_string())
        })?;

        let reply = self
            .transport
            .call(IMPORT_METHOD, payload)
            .await
            .map_err(|e| RpcImportError::new(RpcImportErrorKind::Transport, on.clone(), e.to_string()))?;

        let response: ImportResponse = serde_json::from_slice(&reply).map_err(|e| {
            RpcImportError::new(RpcImportErrorKind::DeserializationFailed, on, e.to_string())
        })?;
        response.into_result()
    }
}

/// Control-side handler: decode a request, run the registered importer and
/// encode its answer. Failures are reported inside the response.
pub async fn serve_import_request(registry: &ImporterRegistry, payload: &[u8]) -> Vec<u8> {
    let response = match serde_json::from_slice::<ImportRequest>(payload) {
        Err(e) => ImportResponse::Err(RpcImportError::new(
            RpcImportErrorKind::DeserializationFailed,
            InstanceId::new("unknown", None),
            e.to_string(),
        )),
        Ok(request) => match registry.get(&request.kind) {
            None => ImportResponse::Err(RpcImportError::new(
                RpcImportErrorKind::UnknownModel,
                InstanceId::new(request.kind.clone(), None),
                "no importer registered in the control domain",
            )),
            Some(importer) => importer.import_batch(request).await.into(),
        },
    };

    encode_response(&response)
}

/// Encode `response`. An empty reply makes the caller fail with
/// `DeserializationFailed`.
fn encode_response(response: &ImportResponse) -> Vec<u8> {
    match serde_json::to_vec(response) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode import response");
            Vec::new()
        }
    }
}

/// Transport that hands requests straight to a control-side registry.
pub struct LoopbackTransport {
    control: ImporterRegistry,
    failures: Mutex<VecDeque<TransportError>>,
}

impl LoopbackTransport {
    /// Serve calls from `control`.
    pub fn new(control: ImporterRegistry) -> Self {
        Self {
            control,
            failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Make the next call fail with `err`.
    pub fn fail_next(&self, err: TransportError) {
        self.failures.lock().push_back(err);
    }
}

#[async_trait]
impl ControlPlaneTransport for LoopbackTransport {
    async fn call(&self, method: &str, payload: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }
        if method != IMPORT_METHOD {
            return Err(TransportError::UnknownMethod(method.to_string()));
        }
        Ok(serve_import_request(&self.control, &payload).await)
    }
}
