//! Conversion from Bot API updates to core [`Update`]s.

use memebot_core::{
    Attachment, AttachmentKind, CallbackAction, ChatId, Sender, SequenceMarker, Update, UserId,
};

use crate::model;

/// Converts one `getUpdates` entry.
///
/// Returns `None` for updates the bot has no use for: service messages,
/// stickers, edits, anything without a sender, and button presses whose
/// message is no longer accessible.
pub fn to_update(raw: model::Update) -> Option<Update> {
    let sequence = SequenceMarker(u64::try_from(raw.update_id).ok()?);

    if let Some(query) = raw.callback_query {
        let message = query.message?;
        let callback = CallbackAction {
            id: query.id,
            data: query.data.unwrap_or_default(),
            message_id: Some(message.message_id),
        };
        return Some(
            Update::new(sequence, ChatId(message.chat.id), sender(&query.from))
                .with_message_id(message.message_id)
                .with_callback(callback),
        );
    }

    let message = raw.message?;
    let from = message.from.as_ref()?;
    let mut update = Update::new(sequence, ChatId(message.chat.id), sender(from))
        .with_message_id(message.message_id);

    if let Some(text) = message.text.or(message.caption) {
        update = update.with_text(text);
    }
    if let Some(photo) = largest_photo(&message.photo) {
        update = update.with_attachment(Attachment {
            file_id: photo.file_id.clone(),
            kind: AttachmentKind::Photo,
            unique_id: Some(photo.file_unique_id.clone()),
            mime_type: None,
            file_name: None,
        });
    }
    if let Some(doc) = message.document
        && doc
            .mime_type
            .as_deref()
            .is_some_and(|mime| mime.starts_with("image/"))
    {
        update = update.with_attachment(Attachment {
            file_id: doc.file_id,
            kind: AttachmentKind::Document,
            unique_id: Some(doc.file_unique_id),
            mime_type: doc.mime_type,
            file_name: doc.file_name,
        });
    }

    if update.is_empty() {
        return None;
    }
    Some(update)
}

fn sender(user: &model::User) -> Sender {
    let sender = Sender::new(UserId(user.id), user.display_name());
    match &user.username {
        Some(username) => sender.with_username(username.clone()),
        None => sender,
    }
}

fn largest_photo(sizes: &[model::PhotoSize]) -> Option<&model::PhotoSize> {
    sizes
        .iter()
        .max_by_key(|p| (u64::from(p.width) * u64::from(p.height), p.file_size))
}
