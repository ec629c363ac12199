//! Record sub-resources: attachments and comments.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use swimlane_client::{MultipartFile, Session};

use crate::error::Result;
use crate::usergroup::UserGroupSelection;

/// Wire tag for an attachment entry inside record values.
pub const ATTACHMENT_TYPE: &str = "Core.Models.Record.Attachment, Core";

/// Wire tag for a comment entry inside record values.
pub const COMMENT_TYPE: &str = "Core.Models.Record.Comments, Core";

/// One uploaded file on an attachment field.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    /// Server-assigned file id used for download.
    pub file_id: String,
    pub filename: String,
    pub uploaded: Option<DateTime<Utc>>,
}

impl Attachment {
    pub(crate) fn from_wire(raw: &Value) -> Option<Self> {
        Some(Self {
            file_id: raw.get("fileId")?.as_str()?.to_string(),
            filename: raw
                .get("filename")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            uploaded: raw
                .get("uploadDate")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        })
    }

    pub(crate) fn to_wire(&self) -> Value {
        let mut wire = json!({
            "$type": ATTACHMENT_TYPE,
            "fileId": self.file_id,
            "filename": self.filename,
        });
        if let Some(uploaded) = self.uploaded {
            wire["uploadDate"] = json!(uploaded.to_rfc3339());
        }
        wire
    }

    /// Download the file contents.
    pub async fn download(&self, session: &Session) -> Result<bytes::Bytes> {
        let bytes = session
            .get_bytes(&format!("attachment/download/{}", self.file_id))
            .await?;
        Ok(bytes)
    }

    /// Upload a file, returning the attachment entries the server created.
    /// The entries still need to be appended to a field and saved to show on
    /// a record.
    pub(crate) async fn upload(
        session: &Session,
        filename: &str,
        data: bytes::Bytes,
        content_type: Option<&str>,
    ) -> Result<Vec<Attachment>> {
        let mut file = MultipartFile::new(filename, data);
        if let Some(content_type) = content_type {
            file = file.with_content_type(content_type);
        }
        let raw: Vec<Value> = session.post_multipart("attachment", vec![file]).await?;
        Ok(raw.iter().filter_map(Attachment::from_wire).collect())
    }
}

impl std::fmt::Display for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Attachment: {}>", self.filename)
    }
}

/// One comment on a comments field.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    /// Who wrote the comment.
    pub origin: Option<UserGroupSelection>,
    pub created: Option<DateTime<Utc>>,
    pub message: String,
    pub rich_text: bool,
}

impl Comment {
    /// Create a new plain-text comment authored now.
    pub fn new(origin: UserGroupSelection, message: impl Into<String>) -> Self {
        Self {
            origin: Some(origin),
            created: Some(Utc::now()),
            message: message.into(),
            rich_text: false,
        }
    }

    /// Mark the comment as rich text (HTML message body).
    pub fn rich_text(mut self) -> Self {
        self.rich_text = true;
        self
    }

    pub(crate) fn from_wire(raw: &Value) -> Option<Self> {
        Some(Self {
            origin: raw.get("createdByUser").and_then(UserGroupSelection::from_wire),
            created: raw
                .get("createdDate")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            message: raw.get("message")?.as_str()?.to_string(),
            rich_text: raw
                .get("isRichText")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    pub(crate) fn to_wire(&self) -> Value {
        let mut wire = json!({
            "$type": COMMENT_TYPE,
            "message": self.message,
            "isRichText": self.rich_text,
        });
        if let Some(ref origin) = self.origin {
            wire["createdByUser"] = origin.to_wire();
        }
        if let Some(created) = self.created {
            wire["createdDate"] = json!(created.to_rfc3339());
        }
        wire
    }
}

impl std::fmt::Display for Comment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Comment: {}>", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attachment_wire_round_trip() {
        let raw = json!({
            "$type": ATTACHMENT_TYPE,
            "fileId": "f123",
            "filename": "evidence.pcap",
            "uploadDate": "2024-05-01T12:00:00+00:00",
        });
        let attachment = Attachment::from_wire(&raw).unwrap();
        assert_eq!(attachment.file_id, "f123");
        assert_eq!(attachment.filename, "evidence.pcap");
        assert!(attachment.uploaded.is_some());

        let wire = attachment.to_wire();
        assert_eq!(wire["fileId"], "f123");
        assert_eq!(wire["$type"], ATTACHMENT_TYPE);
    }

    #[test]
    fn test_comment_wire_round_trip() {
        let comment = Comment::new(UserGroupSelection::new("u1", "Admin"), "looks bad");
        let wire = comment.to_wire();
        assert_eq!(wire["$type"], COMMENT_TYPE);
        assert_eq!(wire["message"], "looks bad");
        assert_eq!(wire["isRichText"], false);
        assert_eq!(wire["createdByUser"]["id"], "u1");

        let parsed = Comment::from_wire(&wire).unwrap();
        assert_eq!(parsed.message, "looks bad");
        assert!(!parsed.rich_text);
    }

    #[test]
    fn test_rich_text_flag() {
        let comment =
            Comment::new(UserGroupSelection::new("u1", "Admin"), "<b>bold</b>").rich_text();
        assert!(comment.rich_text);
        assert_eq!(comment.to_wire()["isRichText"], true);
    }
}
