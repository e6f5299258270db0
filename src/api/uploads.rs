//! Upload collaborator: ship a binary attachment, get a reference URL
//! back. The engine stores returned references in a task's `image_urls`
//! and has no further involvement with file handling.

use std::sync::Arc;

use crate::models::Attachment;
use crate::transport::{RemoteFailure, Transport};

use super::decode;

pub struct UploadsApi {
    transport: Arc<dyn Transport>,
}

impl UploadsApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<Attachment, RemoteFailure> {
        decode(self.transport.upload(filename, bytes).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::RecordingTransport;

    #[tokio::test]
    async fn test_upload_decodes_reference_url() {
        let transport = Arc::new(RecordingTransport::returning(
            serde_json::json!({"url": "http://files/1.png"}),
        ));
        let api = UploadsApi::new(transport);

        let attachment = api.upload("shot.png", vec![1, 2, 3]).await.unwrap();
        assert_eq!(attachment.url, "http://files/1.png");
    }
}
