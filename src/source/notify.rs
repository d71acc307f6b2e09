//! Keyspace notification adapter
//!
//! Subscribes to key-event notifications (`__keyevent@<db>__:<event>`),
//! whose payload is the name of the touched key. Each matching `pmessage`
//! yields one [`RawEvent::KeyTouch`].

use tracing::{debug, warn};

use super::feed::Feed;
use super::wire::split_fields;
use super::EventSource;
use crate::error::{HotkeyError, Result};
use crate::event::{PubSubMessage, RawEvent};

/// Key-event notifications for every event type on database 0
pub const DEFAULT_PATTERN: &str = "__keyevent@0__:*";

/// Pattern-subscribe capability of a store connection
pub trait Subscription: Send {
    /// Subscribe to channels matching `pattern`
    fn psubscribe(&mut self, pattern: &str) -> Result<()>;

    /// Next pending message, without blocking
    fn get_message(&mut self) -> Result<Option<PubSubMessage>>;

    /// Drop every pattern subscription
    fn punsubscribe(&mut self) -> Result<()>;
}

impl Subscription for Feed<PubSubMessage> {
    fn psubscribe(&mut self, pattern: &str) -> Result<()> {
        debug!(feed = %self.label(), pattern, "psubscribe");
        self.activate()
    }

    fn get_message(&mut self) -> Result<Option<PubSubMessage>> {
        Ok(self.try_next())
    }

    fn punsubscribe(&mut self) -> Result<()> {
        self.deactivate();
        Ok(())
    }
}

/// Parse one line of `redis-cli --csv psubscribe` output
///
/// `"pmessage","__keyevent@0__:*","__keyevent@0__:set","user:1"` becomes a
/// pattern message; subscribe confirmations parse with empty fields.
pub fn parse_notification_line(line: &str) -> Option<PubSubMessage> {
    let fields = split_fields(line, ',')?;
    let mut fields = fields.into_iter();
    let kind = fields.next().filter(|k| !k.is_empty())?;
    let pattern = fields.next().unwrap_or_default();
    let channel = fields.next().unwrap_or_default();
    let payload = fields.next().unwrap_or_default();
    Some(PubSubMessage {
        kind,
        pattern,
        channel,
        payload,
    })
}

/// Compiled pattern-subscription glob
///
/// Follows the store's pattern syntax: `*`, `?`, `[abc]`, `[a-z]`, `[^a]`
/// and `\` escapes. Matching is delegated to [`glob::Pattern`] after
/// rewriting the few places where the two syntaxes differ.
#[derive(Debug, Clone)]
pub struct ChannelPattern {
    source: String,
    compiled: glob::Pattern,
}

impl ChannelPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let compiled = glob::Pattern::new(&to_glob(pattern)).map_err(|e| {
            HotkeyError::InvalidConfig(format!("invalid channel pattern '{}': {}", pattern, e))
        })?;
        Ok(Self {
            source: pattern.to_string(),
            compiled,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, channel: &str) -> bool {
        self.compiled.matches(channel)
    }
}

/// Whether `channel` matches the subscription `pattern`; invalid patterns
/// match nothing
pub fn pattern_matches(pattern: &str, channel: &str) -> bool {
    ChannelPattern::new(pattern).is_ok_and(|p| p.matches(channel))
}

/// Rewrite store glob syntax into `glob` crate syntax
fn to_glob(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 4);
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            // `**` is a path wildcard for the glob crate
            '*' => {
                while chars.peek() == Some(&'*') {
                    chars.next();
                }
                out.push('*');
            }
            '\\' => match chars.next() {
                Some(escaped @ ('*' | '?' | '[' | ']')) => {
                    out.push('[');
                    out.push(escaped);
                    out.push(']');
                }
                Some(other) => out.push(other),
                None => out.push('\\'),
            },
            '[' => {
                out.push('[');
                if chars.peek() == Some(&'^') {
                    chars.next();
                    out.push('!');
                }
                while let Some(inner) = chars.next() {
                    match inner {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                out.push(escaped);
                            }
                        }
                        ']' => {
                            out.push(']');
                            break;
                        }
                        other => out.push(other),
                    }
                }
            }
            other => out.push(other),
        }
    }

    out
}

/// Notification adapter over any [`Subscription`]
pub struct NotificationSource<S: Subscription> {
    subscription: S,
    pattern: String,
    matcher: Option<ChannelPattern>,
    subscribed: bool,
}

impl<S: Subscription> NotificationSource<S> {
    pub fn new(subscription: S, pattern: impl Into<String>) -> Self {
        Self {
            subscription,
            pattern: pattern.into(),
            matcher: None,
            subscribed: false,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }
}

impl<S: Subscription> EventSource for NotificationSource<S> {
    fn name(&self) -> &'static str {
        "notify"
    }

    fn open(&mut self) -> Result<()> {
        let matcher = ChannelPattern::new(&self.pattern)?;
        self.subscription
            .psubscribe(&self.pattern)
            .map_err(|e| match e {
                HotkeyError::SourceUnavailable(_) => e,
                other => HotkeyError::SourceUnavailable(other.to_string()),
            })?;
        self.matcher = Some(matcher);
        self.subscribed = true;
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<RawEvent>> {
        while let Some(msg) = self.subscription.get_message()? {
            let matched = self
                .matcher
                .as_ref()
                .is_some_and(|m| m.matches(&msg.channel));
            if msg.is_pmessage() && matched {
                return Ok(Some(RawEvent::KeyTouch { key: msg.payload }));
            }
        }
        Ok(None)
    }

    fn close(&mut self) {
        if !self.subscribed {
            return;
        }
        self.subscribed = false;
        if let Err(e) = self.subscription.punsubscribe() {
            warn!(pattern = %self.pattern, error = %e, "failed to release subscription");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pmessage_line() {
        let msg = parse_notification_line(
            r#""pmessage","__keyevent@0__:*","__keyevent@0__:set","user:1""#,
        )
        .unwrap();
        assert!(msg.is_pmessage());
        assert_eq!(msg.pattern, "__keyevent@0__:*");
        assert_eq!(msg.channel, "__keyevent@0__:set");
        assert_eq!(msg.payload, "user:1");
    }

    #[test]
    fn test_parse_subscribe_confirmation() {
        let msg = parse_notification_line(r#""psubscribe","__keyevent@0__:*",1"#).unwrap();
        assert!(!msg.is_pmessage());
        assert_eq!(msg.channel, "1");
    }

    #[test]
    fn test_parse_rejects_empty_and_broken() {
        assert!(parse_notification_line("").is_none());
        assert!(parse_notification_line(r#""pmessage","unterminated"#).is_none());
    }

    #[test]
    fn test_pattern_matching() {
        assert!(pattern_matches("__keyevent@0__:*", "__keyevent@0__:set"));
        assert!(pattern_matches("__keyevent@?__:*", "__keyevent@3__:del"));
        assert!(pattern_matches("*", ""));
        assert!(pattern_matches("a*b*c", "axxbyyc"));
        assert!(!pattern_matches("__keyevent@0__:*", "__keyspace@0__:user:1"));
        assert!(!pattern_matches("a?c", "ac"));
        assert!(pattern_matches(r"a\*", "a*"));
        assert!(!pattern_matches(r"a\*", "ab"));
        assert!(pattern_matches("a**b", "a/x/b"));
    }

    #[test]
    fn test_pattern_character_classes() {
        assert!(pattern_matches("__keyevent@[01]__:*", "__keyevent@0__:set"));
        assert!(pattern_matches("__keyevent@[01]__:*", "__keyevent@1__:del"));
        assert!(!pattern_matches("__keyevent@[01]__:*", "__keyevent@2__:set"));
        assert!(pattern_matches("__keyevent@[0-3]__:*", "__keyevent@3__:set"));
        assert!(pattern_matches("__keyevent@0__:[^d]*", "__keyevent@0__:set"));
        assert!(!pattern_matches("__keyevent@0__:[^d]*", "__keyevent@0__:del"));
        assert!(pattern_matches(r"a\[b", "a[b"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(ChannelPattern::new("__keyevent@[0__:*").is_err());
        assert!(!pattern_matches("__keyevent@[0__:*", "__keyevent@0__:set"));
    }

    #[test]
    fn test_source_yields_matching_pmessages_only() {
        let (tx, feed) = Feed::channel("notify");
        let mut source = NotificationSource::new(feed, DEFAULT_PATTERN);
        source.open().unwrap();

        tx.send(PubSubMessage {
            kind: "psubscribe".into(),
            pattern: DEFAULT_PATTERN.into(),
            channel: "1".into(),
            payload: String::new(),
        })
        .unwrap();
        tx.send(PubSubMessage::pmessage("*", "__keyspace@0__:x", "set"))
            .unwrap();
        tx.send(PubSubMessage::pmessage(
            DEFAULT_PATTERN,
            "__keyevent@0__:get",
            "user:1",
        ))
        .unwrap();

        assert_eq!(source.poll().unwrap(), Some(RawEvent::key_touch("user:1")));
        assert_eq!(source.poll().unwrap(), None);
    }

    #[test]
    fn test_close_releases_subscription_once() {
        let (_tx, feed) = Feed::<PubSubMessage>::channel("notify");
        let mut source = NotificationSource::new(feed, DEFAULT_PATTERN);
        source.open().unwrap();
        assert!(source.is_subscribed());
        source.close();
        source.close();
        assert!(!source.is_subscribed());
    }

    #[test]
    fn test_open_fails_on_closed_feed() {
        let (_tx, mut feed) = Feed::<PubSubMessage>::channel("notify");
        feed.shutdown();
        let mut source = NotificationSource::new(feed, DEFAULT_PATTERN);
        assert!(matches!(
            source.open(),
            Err(HotkeyError::SourceUnavailable(_))
        ));
    }
}
