//! Packet event correlation.
//!
//! Nodes report event attributes either as plain text or base64 text,
//! depending on the CometBFT version and chain. Attribute keys and values in
//! one event always share an encoding, so the encoding is detected from the
//! first key lookup and reused for every other read on that event.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::CoreError;
use crate::tracer::EventQuery;
use crate::types::{IbcHop, TxEvent, TxResult};

const SEND_PACKET: &str = "send_packet";
const RECV_PACKET: &str = "recv_packet";
const ATTR_SRC_PORT: &str = "packet_src_port";
const ATTR_SRC_CHANNEL: &str = "packet_src_channel";
const ATTR_SEQUENCE: &str = "packet_sequence";

// ==============================================================================
// Encoding Matcher
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeEncoding {
    Plain,
    Base64,
}

impl AttributeEncoding {
    pub fn encode(self, plain: &str) -> String {
        match self {
            Self::Plain => plain.to_owned(),
            Self::Base64 => STANDARD.encode(plain),
        }
    }

    /// Decode a raw attribute string. `None` if it is not valid in this
    /// encoding.
    pub fn decode(self, raw: &str) -> Option<String> {
        match self {
            Self::Plain => Some(raw.to_owned()),
            Self::Base64 => STANDARD
                .decode(raw)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok()),
        }
    }
}

/// Compare a raw attribute string with the expected plain text and report
/// which encoding matched.
pub fn match_plain_or_base64(candidate: &str, expected: &str) -> Option<AttributeEncoding> {
    if candidate == expected {
        return Some(AttributeEncoding::Plain);
    }
    if candidate == STANDARD.encode(expected) {
        return Some(AttributeEncoding::Base64);
    }
    None
}

/// An event whose attribute encoding has been pinned by a key match.
struct EncodedEvent<'a> {
    event: &'a TxEvent,
    encoding: AttributeEncoding,
}

impl<'a> EncodedEvent<'a> {
    /// Pin the encoding by locating `anchor_key` in either form.
    fn detect(event: &'a TxEvent, anchor_key: &str) -> Option<Self> {
        event.attributes.iter().find_map(|attr| {
            match_plain_or_base64(&attr.key, anchor_key).map(|encoding| Self { event, encoding })
        })
    }

    fn value(&self, key: &str) -> Option<String> {
        let encoded_key = self.encoding.encode(key);
        self.event
            .attributes
            .iter()
            .find(|attr| attr.key == encoded_key)
            .and_then(|attr| self.encoding.decode(&attr.value))
    }

    fn value_equals(&self, key: &str, expected: &str) -> bool {
        self.value(key).as_deref() == Some(expected)
    }
}

// ==============================================================================
// Packet Lookup
// ==============================================================================

/// Index of the `recv_packet` event for the given source port, channel and
/// sequence.
pub fn find_recv_packet_index(
    tx: &TxResult,
    src_port: &str,
    src_channel: &str,
    sequence: &str,
) -> Result<usize, CoreError> {
    require_events(tx)?;
    tx.events
        .iter()
        .position(|event| {
            event.kind == RECV_PACKET
                && EncodedEvent::detect(event, ATTR_SRC_PORT).is_some_and(|view| {
                    view.value_equals(ATTR_SRC_PORT, src_port)
                        && view.value_equals(ATTR_SRC_CHANNEL, src_channel)
                        && view.value_equals(ATTR_SEQUENCE, sequence)
                })
        })
        .ok_or_else(|| {
            CoreError::EventExtraction(format!(
                "no recv_packet for {src_port}/{src_channel} sequence {sequence} in tx {}",
                tx.hash
            ))
        })
}

/// Sequence of the first `send_packet` event from `src_port`/`src_channel`,
/// searching from `start_index` onwards.
///
/// A tx may carry several messages, so when following a forwarded packet the
/// search starts at the matching `recv_packet`: the nearest following
/// `send_packet` is the forward.
pub fn find_packet_sequence(
    tx: &TxResult,
    src_port: &str,
    src_channel: &str,
    start_index: usize,
) -> Result<String, CoreError> {
    require_events(tx)?;
    let view = tx
        .events
        .iter()
        .skip(start_index)
        .filter(|event| event.kind == SEND_PACKET)
        .filter_map(|event| EncodedEvent::detect(event, ATTR_SRC_PORT))
        .find(|view| {
            view.value_equals(ATTR_SRC_PORT, src_port)
                && view.value_equals(ATTR_SRC_CHANNEL, src_channel)
        })
        .ok_or_else(|| {
            CoreError::EventExtraction(format!(
                "no send_packet for {src_port}/{src_channel} in tx {}",
                tx.hash
            ))
        })?;

    view.value(ATTR_SEQUENCE).ok_or_else(|| {
        CoreError::EventExtraction(format!(
            "send_packet for {src_port}/{src_channel} has no sequence in tx {}",
            tx.hash
        ))
    })
}

fn require_events(tx: &TxResult) -> Result<(), CoreError> {
    if tx.events.is_empty() {
        return Err(CoreError::EventExtraction(format!(
            "tx {} carries no events",
            tx.hash
        )));
    }
    Ok(())
}

/// Query for the tx on `target`'s counterparty chain that received the
/// packet, narrowed to txs that also forward over `next` when present.
pub fn recv_packet_query(target: &IbcHop, sequence: &str, next: Option<&IbcHop>) -> EventQuery {
    let mut query = EventQuery::new()
        .with(format!("{RECV_PACKET}.{ATTR_SRC_PORT}"), &target.port_id)
        .with(format!("{RECV_PACKET}.{ATTR_SRC_CHANNEL}"), &target.channel_id)
        .with(format!("{RECV_PACKET}.{ATTR_SEQUENCE}"), sequence);
    if let Some(next) = next {
        query = query
            .with(format!("{SEND_PACKET}.{ATTR_SRC_PORT}"), &next.port_id)
            .with(format!("{SEND_PACKET}.{ATTR_SRC_CHANNEL}"), &next.channel_id);
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;

    #[test]
    fn matcher_reports_plain_and_base64() {
        assert_eq!(
            match_plain_or_base64("packet_sequence", "packet_sequence"),
            Some(AttributeEncoding::Plain)
        );
        assert_eq!(
            match_plain_or_base64("cGFja2V0X3NlcXVlbmNl", "packet_sequence"),
            Some(AttributeEncoding::Base64)
        );
        assert_eq!(match_plain_or_base64("packet_data", "packet_sequence"), None);
    }

    #[test]
    fn send_packet_sequence_in_plain_and_base64_events() {
        let plain = make_tx_result(0, vec![send_packet("transfer", "channel-0", "7")]);
        assert_eq!(
            find_packet_sequence(&plain, "transfer", "channel-0", 0).expect("plain must match"),
            "7"
        );

        let encoded = make_tx_result(0, vec![base64_event(send_packet("transfer", "channel-0", "7"))]);
        assert_eq!(
            find_packet_sequence(&encoded, "transfer", "channel-0", 0).expect("base64 must match"),
            "7"
        );
    }

    #[test]
    fn encoded_keys_with_plain_values_do_not_match() {
        let mut event = base64_event(send_packet("transfer", "channel-0", "7"));
        for attr in &mut event.attributes {
            attr.value = AttributeEncoding::Base64
                .decode(&attr.value)
                .expect("fixture values are valid base64");
        }
        let tx = make_tx_result(0, vec![event]);
        assert!(find_packet_sequence(&tx, "transfer", "channel-0", 0).is_err());

        let mut recv = base64_event(recv_packet("transfer", "channel-0", "7"));
        recv.attributes[2].value = "7".into();
        let tx = make_tx_result(0, vec![recv]);
        assert!(find_recv_packet_index(&tx, "transfer", "channel-0", "7").is_err());
    }

    #[test]
    fn forward_is_the_first_send_after_the_matching_recv() {
        let tx = make_tx_result(
            0,
            vec![
                send_packet("transfer", "channel-9", "1"),
                recv_packet("transfer", "channel-0", "6"),
                send_packet("transfer", "channel-9", "11"),
                recv_packet("transfer", "channel-0", "7"),
                send_packet("transfer", "channel-9", "12"),
                send_packet("transfer", "channel-9", "13"),
            ],
        );

        let index = find_recv_packet_index(&tx, "transfer", "channel-0", "7").expect("recv found");
        assert_eq!(index, 3);
        assert_eq!(
            find_packet_sequence(&tx, "transfer", "channel-9", index).expect("send found"),
            "12"
        );
    }

    #[test]
    fn missing_packets_are_extraction_errors() {
        let empty = make_tx_result(0, vec![]);
        assert!(matches!(
            find_packet_sequence(&empty, "transfer", "channel-0", 0),
            Err(CoreError::EventExtraction(_))
        ));

        let tx = make_tx_result(0, vec![send_packet("transfer", "channel-1", "3")]);
        assert!(find_packet_sequence(&tx, "transfer", "channel-0", 0).is_err());
        assert!(find_packet_sequence(&tx, "transfer", "channel-1", 1).is_err());
        assert!(find_recv_packet_index(&tx, "transfer", "channel-1", "3").is_err());
    }

    #[test]
    fn query_includes_forward_channel_only_when_present() {
        let target = hop("channel-0", "juno-1");
        let next = hop("channel-9", "stargaze-1");

        let single = recv_packet_query(&target, "7", None);
        assert_eq!(
            single.to_query_string(),
            "recv_packet.packet_src_port='transfer' AND recv_packet.packet_src_channel='channel-0' \
             AND recv_packet.packet_sequence='7'"
        );

        let forwarded = recv_packet_query(&target, "7", Some(&next));
        assert_eq!(forwarded.pairs().len(), 5);
        assert!(forwarded
            .to_query_string()
            .ends_with("send_packet.packet_src_channel='channel-9'"));
    }
}
