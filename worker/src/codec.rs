//! Decoding incoming deliveries into [`IncomingMessage`], and encoding [`TaskCallback`] for
//! publication.

use chrono::{DateTime, Utc};
use lapin::message::Delivery;
use lapin::types::AMQPValue;
use serde_json::Value;

use crate::error::DecodeError;
use crate::model::IncomingMessage;

const TASK_ID_HEADER: &str = "task_id";
const TASK_ID_FIELD: &str = "task_id";
const SUBMISSION_DATE_FIELD: &str = "submission_date";

/// Decodes a raw AMQP delivery into an [`IncomingMessage`].
///
/// `task_id` is looked for first in the AMQP header table, then as a top-level field of the
/// JSON body. If found in the body, the field is removed so handlers see the payload without
/// the routing metadata mixed in. `submission_date`, if present as a top-level string field, is
/// parsed as RFC 3339 and likewise removed.
pub(crate) fn decode(delivery: &Delivery) -> Result<IncomingMessage, DecodeError> {
    let mut body: Value = serde_json::from_slice(&delivery.data)?;
    let object = match body.as_object_mut() {
        Some(object) => object,
        None => return Err(DecodeError::NotAnObject(json_type_name(&body))),
    };

    let header_task_id = delivery
        .properties
        .headers()
        .as_ref()
        .and_then(|headers| headers.inner().get(TASK_ID_HEADER))
        .and_then(amqp_value_as_string);

    let task_id = match header_task_id {
        Some(id) => id,
        None => match object.remove(TASK_ID_FIELD) {
            Some(Value::String(id)) => id,
            _ => return Err(DecodeError::MissingTaskId),
        },
    };

    let submission_date = match object.remove(SUBMISSION_DATE_FIELD) {
        Some(Value::String(raw)) => DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .ok(),
        _ => None,
    };

    let reply_to = delivery
        .properties
        .reply_to()
        .as_ref()
        .map(|s| s.to_string());
    let correlation_id = delivery
        .properties
        .correlation_id()
        .as_ref()
        .map(|s| s.to_string());

    Ok(IncomingMessage {
        task_id,
        body,
        submission_date,
        reply_to,
        correlation_id,
    })
}

fn amqp_value_as_string(value: &AMQPValue) -> Option<String> {
    match value {
        AMQPValue::LongString(s) => Some(s.to_string()),
        AMQPValue::ShortString(s) => Some(s.to_string()),
        _ => None,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Encodes a callback as a JSON byte string ready for publication.
pub(crate) fn encode(callback: &crate::model::TaskCallback) -> Vec<u8> {
    serde_json::to_vec(callback).expect("TaskCallback always serializes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TaskCallback, TaskStatus};
    use lapin::protocol::basic::AMQPProperties;
    use lapin::types::{AMQPValue, FieldTable, LongString};

    fn delivery_with(body: &str, properties: AMQPProperties) -> Delivery {
        Delivery {
            delivery_tag: 1,
            exchange: "".into(),
            routing_key: "in".into(),
            redelivered: false,
            properties,
            data: body.as_bytes().to_vec(),
            acker: lapin::acker::Acker::default(),
        }
    }

    #[test]
    fn task_id_from_header_takes_precedence_and_body_stays_intact() {
        let mut headers = FieldTable::default();
        headers.insert(TASK_ID_HEADER.into(), AMQPValue::LongString(LongString::from("hdr-1")));
        let properties = AMQPProperties::default().with_headers(headers);
        let delivery = delivery_with(r#"{"task_id": "body-1", "x": 1}"#, properties);

        let message = decode(&delivery).unwrap();
        assert_eq!(message.task_id, "hdr-1");
        // Body-level task_id is left alone since the header won.
        assert_eq!(message.body["task_id"], "body-1");
    }

    #[test]
    fn task_id_falls_back_to_body_field_and_is_removed() {
        let delivery = delivery_with(r#"{"task_id": "body-1", "x": 1}"#, AMQPProperties::default());
        let message = decode(&delivery).unwrap();
        assert_eq!(message.task_id, "body-1");
        assert!(message.body.get("task_id").is_none());
        assert_eq!(message.body["x"], 1);
    }

    #[test]
    fn missing_task_id_is_an_error() {
        let delivery = delivery_with(r#"{"x": 1}"#, AMQPProperties::default());
        assert!(matches!(decode(&delivery), Err(DecodeError::MissingTaskId)));
    }

    #[test]
    fn non_object_body_is_an_error() {
        let delivery = delivery_with("[1, 2, 3]", AMQPProperties::default());
        assert!(matches!(decode(&delivery), Err(DecodeError::NotAnObject("array"))));
    }

    #[test]
    fn submission_date_is_parsed_and_removed() {
        let delivery = delivery_with(
            r#"{"task_id": "t1", "submission_date": "2026-01-01T00:00:00Z"}"#,
            AMQPProperties::default(),
        );
        let message = decode(&delivery).unwrap();
        assert!(message.submission_date.is_some());
        assert!(message.body.get("submission_date").is_none());
    }

    #[test]
    fn encode_emits_null_response_rather_than_omitting_it() {
        let callback = TaskCallback {
            task_id: "t1".into(),
            status: TaskStatus::Running,
            submission_date: None,
            start_date: None,
            end_date: None,
            progress: None,
            response: None,
        };
        let bytes = encode(&callback);
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["response"], Value::Null);
        assert!(value.get("start_date").is_none());
    }
}
