use bytes::Bytes;
use chrono::NaiveDateTime;
use rumqttc::QoS;
use std::fmt;

/// A message received from the broker
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingMessage {
    pub topic: String,
    pub payload: Bytes,
    pub received: NaiveDateTime,
}

impl IncomingMessage {
    pub fn from_topic(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        IncomingMessage {
            topic: topic.into(),
            payload: payload.into(),
            received: chrono::Local::now().naive_local(),
        }
    }

    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

impl fmt::Display for IncomingMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} from topic: {}", self.payload_text(), self.topic)
    }
}

/// A message about to be published
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

impl OutgoingMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>, retain: bool) -> Self {
        OutgoingMessage {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retain,
        }
    }

    /// Payload rendered as text, lossy for binary content
    pub fn render_payload(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

pub fn qos_level(qos: QoS) -> u8 {
    match qos {
        QoS::AtMostOnce => 0,
        QoS::AtLeastOnce => 1,
        QoS::ExactlyOnce => 2,
    }
}

impl fmt::Display for OutgoingMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Publishing to topic '{}': {} (QoS={}, Retained={})",
            self.topic,
            self.render_payload(),
            qos_level(self.qos),
            self.retain
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_trace_line() {
        let msg = OutgoingMessage::new("mac2mqtt/h/status/alive", "true", true);
        assert_eq!(
            msg.to_string(),
            "Publishing to topic 'mac2mqtt/h/status/alive': true (QoS=0, Retained=true)"
        );
    }

    #[test]
    fn binary_payload_is_shown_as_text() {
        let msg = OutgoingMessage::new("t", br#"{"name":"x"}"#.to_vec(), false);
        assert_eq!(msg.render_payload(), r#"{"name":"x"}"#);
    }
}
