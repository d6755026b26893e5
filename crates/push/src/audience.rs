//! Who gets notified about a new message.

use std::collections::BTreeSet;

use {
    herald_common::model::{Channel, EmbeddedRef, RefKind, UserId},
    herald_repository::Repository,
    tracing::debug,
};

use crate::error::{NotifyError, Result};

/// How a channel selects its notification audience. Forced beats private.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelClass {
    /// Every non-bot user, mutes ignored.
    Forced,
    /// The private member set.
    Private,
    /// Subscribers plus mentioned users and members of mentioned tags.
    Normal,
}

impl ChannelClass {
    pub fn of(channel: &Channel) -> Self {
        if channel.is_forced {
            Self::Forced
        } else if !channel.is_public {
            Self::Private
        } else {
            Self::Normal
        }
    }
}

/// Compute the recipient set for a message posted by `author` in `channel`.
///
/// `private_members` is the channel's private member list, already fetched
/// for payload shaping. The author is never a recipient; outside forced
/// channels neither are users who muted the channel.
pub async fn compute_audience(
    repo: &dyn Repository,
    channel: &Channel,
    author: UserId,
    embedded: &[EmbeddedRef],
    private_members: &[UserId],
) -> Result<BTreeSet<UserId>> {
    let class = ChannelClass::of(channel);
    let mut targets = BTreeSet::new();

    match class {
        ChannelClass::Forced => {
            let users = repo
                .get_users()
                .await
                .map_err(NotifyError::storage("get users"))?;
            targets.extend(users.into_iter().filter(|u| !u.bot).map(|u| u.id));
        },
        ChannelClass::Private => targets.extend(private_members.iter().copied()),
        ChannelClass::Normal => {
            let subscribers = repo
                .get_subscribing_user_ids(channel.id)
                .await
                .map_err(NotifyError::storage("get subscribing users"))?;
            targets.extend(subscribers);

            for r in embedded {
                match r.kind {
                    RefKind::User => match r.uuid() {
                        Some(id) => {
                            targets.insert(id);
                        },
                        None => debug!(raw = %r.raw, id = %r.id, "skipping malformed user mention"),
                    },
                    RefKind::Tag => match r.uuid() {
                        Some(tag_id) => {
                            let tagged = repo
                                .get_user_ids_by_tag_id(tag_id)
                                .await
                                .map_err(NotifyError::storage("get tagged users"))?;
                            targets.extend(tagged);
                        },
                        None => debug!(raw = %r.raw, id = %r.id, "skipping malformed tag mention"),
                    },
                    _ => {},
                }
            }
        },
    }

    targets.remove(&author);
    if class != ChannelClass::Forced {
        let muted = repo
            .get_mute_user_ids(channel.id)
            .await
            .map_err(NotifyError::storage("get muted users"))?;
        for id in muted {
            targets.remove(&id);
        }
    }

    debug!(channel_id = %channel.id, ?class, recipients = targets.len(), "audience computed");
    Ok(targets)
}
