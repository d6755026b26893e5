//! Notification payload shaping.
//!
//! The payload is a flat map of strings (the push `data` block) built from the
//! message, its sender and its channel. Shaping itself is pure; the lookups it
//! needs are done by the caller, except for [`select_thumbnail`].

use {
    herald_common::model::{EmbeddedRef, FileId, Message, RefKind, User},
    herald_repository::Repository,
    serde::Serialize,
    tracing::debug,
};

use crate::error::{NotifyError, Result};

/// Bodies longer than this many code points are truncated.
pub const MAX_BODY_CHARS: usize = 100;
/// Code points kept from a truncated body, before the ellipsis.
pub const TRUNCATED_BODY_CHARS: usize = 97;
pub const UNKNOWN_SENDER: &str = "[unknown user]";
pub const VIBRATION_PATTERN: &str = "[1000, 1000, 1000]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    /// Client deep link.
    pub path: String,
    pub icon: String,
    /// Groups notifications per channel.
    pub tag: String,
    pub badge: String,
    pub vibration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Everything shaping needs to know about one message.
#[derive(Debug, Clone, Copy)]
pub struct ShapeInput<'a> {
    pub message: &'a Message,
    pub plain: &'a str,
    /// `None` when the author could not be resolved.
    pub sender: Option<&'a User>,
    pub private_member_count: usize,
    /// Channel path without the leading `#`.
    pub channel_path: &'a str,
    /// File whose thumbnail becomes the notification image.
    pub thumbnail: Option<FileId>,
}

#[derive(Debug, Clone)]
pub struct PayloadShaper {
    origin: String,
}

impl PayloadShaper {
    pub fn new(origin: &str) -> Self {
        Self {
            origin: origin.trim_end_matches('/').to_owned(),
        }
    }

    pub fn shape(&self, input: &ShapeInput<'_>) -> PushPayload {
        let origin = &self.origin;
        let message = input.message;
        let direct = matches!(input.private_member_count, 1 | 2);

        let (title, path) = match input.sender {
            Some(sender) if direct => (
                format!("@{}", sender.display_or_name()),
                format!("/users/{}", sender.name),
            ),
            _ => (
                format!("#{}", input.channel_path),
                format!("/channels/{}", input.channel_path),
            ),
        };

        let body = if direct {
            input.plain.to_owned()
        } else {
            let name = input.sender.map_or(UNKNOWN_SENDER, User::display_or_name);
            format!("{name}: {}", input.plain)
        };

        PushPayload {
            title,
            body: truncate_body(&body),
            path,
            icon: format!("{origin}/api/1.0/users/{}/icon?thumb", message.user_id),
            tag: format!("c:{}", message.channel_id),
            badge: format!("{origin}/static/badge.png"),
            vibration: VIBRATION_PATTERN.to_owned(),
            image: input
                .thumbnail
                .map(|id| format!("{origin}/api/1.0/files/{id}/thumbnail")),
        }
    }
}

/// Cut `body` to [`MAX_BODY_CHARS`] code points, ending it with `...` when
/// anything was removed.
pub fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_BODY_CHARS {
        return body.to_owned();
    }
    let mut out: String = body.chars().take(TRUNCATED_BODY_CHARS).collect();
    out.push_str("...");
    out
}

/// The first referenced file that has a thumbnail. Files that no longer
/// exist are skipped.
pub async fn select_thumbnail(
    repo: &dyn Repository,
    embedded: &[EmbeddedRef],
) -> Result<Option<FileId>> {
    for r in embedded.iter().filter(|r| r.kind == RefKind::File) {
        let Some(id) = r.uuid() else {
            debug!(id = %r.id, "skipping malformed file reference");
            continue;
        };
        match repo.get_file_meta(id).await {
            Ok(meta) if meta.has_thumbnail => return Ok(Some(id)),
            Ok(_) => {},
            Err(e) if e.is_not_found() => debug!(file_id = %id, "referenced file not found"),
            Err(e) => return Err(NotifyError::storage("get file meta")(e)),
        }
    }
    Ok(None)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        herald_common::model::FileMeta,
        herald_repository::{Fixture, MemoryRepository},
        rstest::rstest,
        uuid::Uuid,
    };

    const ORIGIN: &str = "https://chat.example.com/";

    fn message() -> Message {
        serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "user_id": Uuid::new_v4(),
            "channel_id": Uuid::new_v4(),
            "text": "hello",
        }))
        .unwrap()
    }

    fn sender(name: &str, display: &str) -> User {
        serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "name": name,
            "display_name": display,
        }))
        .unwrap()
    }

    fn input<'a>(
        message: &'a Message,
        sender: Option<&'a User>,
        members: usize,
        plain: &'a str,
    ) -> ShapeInput<'a> {
        ShapeInput {
            message,
            plain,
            sender,
            private_member_count: members,
            channel_path: "team/general",
            thumbnail: None,
        }
    }

    #[rstest]
    #[case::short("hello".to_owned(), "hello".to_owned())]
    #[case::exactly_limit("a".repeat(100), "a".repeat(100))]
    #[case::long_ascii("a".repeat(150), format!("{}...", "a".repeat(97)))]
    #[case::multibyte("あ".repeat(101), format!("{}...", "あ".repeat(97)))]
    #[case::multibyte_at_limit("é".repeat(100), "é".repeat(100))]
    fn truncation(#[case] body: String, #[case] expected: String) {
        assert_eq!(truncate_body(&body), expected);
    }

    #[test]
    fn public_channel_uses_channel_title_and_sender_prefix() {
        let msg = message();
        let alice = sender("alice", "Alice");
        let p = PayloadShaper::new(ORIGIN).shape(&input(&msg, Some(&alice), 0, "hello"));

        assert_eq!(p.title, "#team/general");
        assert_eq!(p.path, "/channels/team/general");
        assert_eq!(p.body, "Alice: hello");
        assert_eq!(
            p.icon,
            format!("https://chat.example.com/api/1.0/users/{}/icon?thumb", msg.user_id)
        );
        assert_eq!(p.tag, format!("c:{}", msg.channel_id));
        assert_eq!(p.badge, "https://chat.example.com/static/badge.png");
        assert_eq!(p.image, None);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    fn direct_message_uses_sender_title(#[case] members: usize) {
        let msg = message();
        let bob = sender("bob", "");
        let p = PayloadShaper::new(ORIGIN).shape(&input(&msg, Some(&bob), members, "psst"));

        assert_eq!(p.title, "@bob");
        assert_eq!(p.path, "/users/bob");
        assert_eq!(p.body, "psst");
    }

    #[test]
    fn larger_private_channel_is_titled_by_path() {
        let msg = message();
        let bob = sender("bob", "Bob");
        let p = PayloadShaper::new(ORIGIN).shape(&input(&msg, Some(&bob), 3, "hi"));
        assert_eq!(p.title, "#team/general");
        assert_eq!(p.body, "Bob: hi");
    }

    #[test]
    fn unknown_sender_falls_back() {
        let msg = message();
        let p = PayloadShaper::new(ORIGIN).shape(&input(&msg, None, 0, "hi"));
        assert_eq!(p.body, "[unknown user]: hi");

        let direct = PayloadShaper::new(ORIGIN).shape(&input(&msg, None, 2, "hi"));
        assert_eq!(direct.title, "#team/general");
        assert_eq!(direct.body, "hi");
    }

    #[test]
    fn prefix_counts_toward_truncation() {
        let msg = message();
        let alice = sender("alice", "");
        let plain = "x".repeat(100);
        let p = PayloadShaper::new(ORIGIN).shape(&input(&msg, Some(&alice), 0, &plain));
        assert_eq!(p.body.chars().count(), 100);
        assert!(p.body.starts_with("alice: xxx"));
        assert!(p.body.ends_with("..."));
    }

    #[test]
    fn image_is_thumbnail_url() {
        let msg = message();
        let file = Uuid::new_v4();
        let mut i = input(&msg, None, 0, "pic");
        i.thumbnail = Some(file);
        let p = PayloadShaper::new(ORIGIN).shape(&i);
        assert_eq!(
            p.image.as_deref(),
            Some(format!("https://chat.example.com/api/1.0/files/{file}/thumbnail").as_str())
        );

        let data = serde_json::to_value(&p).unwrap();
        assert!(data["image"].is_string());
        assert_eq!(data["vibration"], VIBRATION_PATTERN);
    }

    fn file(has_thumbnail: bool) -> FileMeta {
        FileMeta {
            id: Uuid::new_v4(),
            name: "f".into(),
            mime: "image/png".into(),
            size: 1,
            has_thumbnail,
        }
    }

    fn file_ref(id: impl ToString) -> EmbeddedRef {
        EmbeddedRef {
            raw: "file".into(),
            kind: RefKind::File,
            id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn first_file_with_thumbnail_wins() {
        let (plain, first, second) = (file(false), file(true), file(true));
        let repo = MemoryRepository::from_fixture(Fixture {
            files: vec![plain.clone(), first.clone(), second.clone()],
            ..Default::default()
        });
        let embedded = vec![
            file_ref(Uuid::new_v4()),
            file_ref("garbage"),
            file_ref(plain.id),
            file_ref(first.id),
            file_ref(second.id),
        ];
        assert_eq!(
            select_thumbnail(&repo, &embedded).await.unwrap(),
            Some(first.id)
        );
    }

    #[tokio::test]
    async fn no_thumbnail_without_file_refs() {
        let repo = MemoryRepository::new();
        repo.fail_operation("get_file_meta");
        assert_eq!(select_thumbnail(&repo, &[]).await.unwrap(), None);
    }
}
