//! Predicates that narrow a candidate list of bots for one event.

use herald_common::model::{Bot, BotEventType, BotState, ChannelId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotFilter {
    /// Bot is in exactly this state.
    State(BotState),
    /// Bot subscribed to the event.
    Subscribes(BotEventType),
    /// Bot may see channel-unscoped broadcasts.
    Privileged,
    /// Bot is joined to the channel.
    ChannelMember(ChannelId),
    /// Bot does not post as this user.
    NotSelf(UserId),
}

impl BotFilter {
    pub fn matches(&self, bot: &Bot) -> bool {
        match *self {
            Self::State(state) => bot.state == state,
            Self::Subscribes(event) => bot.subscribes(event),
            Self::Privileged => bot.privileged,
            Self::ChannelMember(channel_id) => bot.is_member_of(channel_id),
            Self::NotSelf(user_id) => bot.bot_user_id != user_id,
        }
    }
}

/// Keep the bots that pass every filter. Filters are checked in order and
/// stop at the first miss.
pub fn apply_filters(bots: Vec<Bot>, filters: &[BotFilter]) -> Vec<Bot> {
    bots.into_iter()
        .filter(|bot| filters.iter().all(|f| f.matches(bot)))
        .collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest, std::collections::HashSet, uuid::Uuid};

    fn bot(state: BotState, privileged: bool, events: &[BotEventType]) -> Bot {
        Bot {
            id: Uuid::new_v4(),
            bot_user_id: Uuid::new_v4(),
            creator_id: Uuid::new_v4(),
            display_name: "bot".into(),
            description: String::new(),
            state,
            privileged,
            subscribe_events: events.iter().copied().collect(),
            webhook_url: "http://bot.invalid".into(),
            verification_token: "tok".into(),
            channel_ids: HashSet::new(),
        }
    }

    #[rstest]
    #[case(BotState::Active, true)]
    #[case(BotState::Paused, false)]
    #[case(BotState::Inactive, false)]
    fn state_filter(#[case] state: BotState, #[case] keep: bool) {
        let b = bot(state, false, &[]);
        assert_eq!(BotFilter::State(BotState::Active).matches(&b), keep);
    }

    #[test]
    fn not_self_excludes_author_bot() {
        let b = bot(BotState::Active, false, &[]);
        assert!(!BotFilter::NotSelf(b.bot_user_id).matches(&b));
        assert!(BotFilter::NotSelf(Uuid::new_v4()).matches(&b));
    }

    #[test]
    fn channel_member_uses_snapshot() {
        let mut b = bot(BotState::Active, false, &[]);
        let ch = Uuid::new_v4();
        assert!(!BotFilter::ChannelMember(ch).matches(&b));
        b.channel_ids.insert(ch);
        assert!(BotFilter::ChannelMember(ch).matches(&b));
    }

    #[test]
    fn all_filters_must_pass() {
        let keep = bot(BotState::Active, true, &[BotEventType::UserCreated]);
        let keep_id = keep.id;
        let bots = vec![
            keep,
            bot(BotState::Active, false, &[BotEventType::UserCreated]),
            bot(BotState::Paused, true, &[BotEventType::UserCreated]),
            bot(BotState::Active, true, &[BotEventType::ChannelCreated]),
        ];
        let kept = apply_filters(bots, &[
            BotFilter::Privileged,
            BotFilter::State(BotState::Active),
            BotFilter::Subscribes(BotEventType::UserCreated),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, keep_id);
    }

    #[test]
    fn no_filters_keeps_everything() {
        let bots = vec![bot(BotState::Paused, false, &[])];
        assert_eq!(apply_filters(bots, &[]).len(), 1);
    }
}
