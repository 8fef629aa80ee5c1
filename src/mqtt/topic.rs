//! Topic parsing (§4.1): three semantic slots — `type`, `channel`, `user` —
//! sit at fixed positions from the end of the path, regardless of how many
//! region-segments prefix it (`msh/+/2/...` through `msh/+/+/+/+/2/...`).

/// The kind derived from a topic's `type` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    /// Binary protobuf envelope.
    Protobuf,
    /// JSON-encoded envelope (`type == "json"`).
    Json,
    /// Broker status message, ignored (`type == "stat"`).
    Stat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTopic {
    pub kind: TopicKind,
    pub channel: String,
    pub user: String,
}

/// Parses a topic's trailing three slots. Returns `None` if the topic has
/// fewer than three `/`-delimited segments.
pub fn parse_topic(topic: &str) -> Option<ParsedTopic> {
    let segments: Vec<&str> = topic.split('/').collect();
    if segments.len() < 3 {
        return None;
    }

    let n = segments.len();
    let kind_slot = segments[n - 3];
    let channel = segments[n - 2].to_string();
    let user = segments[n - 1].to_string();

    let kind = match kind_slot {
        "stat" => TopicKind::Stat,
        "json" => TopicKind::Json,
        _ => TopicKind::Protobuf,
    };

    Some(ParsedTopic { kind, channel, user })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_topic() {
        let parsed = parse_topic("msh/2/e/LongFast/!gwA").unwrap();
        assert_eq!(parsed.kind, TopicKind::Protobuf);
        assert_eq!(parsed.channel, "LongFast");
        assert_eq!(parsed.user, "!gwA");
    }

    #[test]
    fn parses_topic_with_region_prefix() {
        let parsed = parse_topic("msh/msk/2/e/LongFast/!gwA").unwrap();
        assert_eq!(parsed.kind, TopicKind::Protobuf);
        assert_eq!(parsed.channel, "LongFast");
        assert_eq!(parsed.user, "!gwA");
    }

    #[test]
    fn parses_deeply_nested_region_prefix() {
        let parsed = parse_topic("msh/EU_868/ru/kgd/2/e/LongFast/!gwA").unwrap();
        assert_eq!(parsed.channel, "LongFast");
        assert_eq!(parsed.user, "!gwA");
    }

    #[test]
    fn stat_topic_is_tagged_stat() {
        let parsed = parse_topic("msh/msk/2/stat/!gwA").unwrap();
        assert_eq!(parsed.kind, TopicKind::Stat);
    }

    #[test]
    fn json_topic_is_tagged_json() {
        let parsed = parse_topic("msh/msk/2/json/LongFast/!gwA").unwrap();
        assert_eq!(parsed.kind, TopicKind::Json);
    }

    #[test]
    fn short_topic_returns_none() {
        assert!(parse_topic("msh/2").is_none());
    }
}
