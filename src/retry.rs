//! Retry policy for failed deliveries.

use lapin::{types::AMQPValue, BasicProperties};

/// Decides whether a failed delivery goes back through the retry queue.
///
/// With no cap (the default) a failing message cycles between the main queue
/// and the retry queue forever. With a cap, the broker-maintained `x-death`
/// header tells how many times the message has already expired out of the
/// retry queue; once that reaches the cap the message is dead-lettered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: Option<u32>,
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self { max_retries: None }
    }

    pub fn capped(max_retries: u32) -> Self {
        Self { max_retries: Some(max_retries) }
    }

    /// Checks if a message that has already been retried `retry_count` times
    /// may be retried again.
    pub fn should_retry(&self, retry_count: u32) -> bool {
        match self.max_retries {
            Some(max) => retry_count < max,
            None => true,
        }
    }
}

/// Number of times a message has expired out of `retry_queue`, as recorded by
/// the broker in the `x-death` header. Zero for a first delivery.
pub fn retry_count(properties: &BasicProperties, retry_queue: &str) -> u32 {
    let Some(headers) = properties.headers().as_ref() else {
        return 0;
    };
    let Some(AMQPValue::FieldArray(deaths)) = headers.inner().get("x-death") else {
        return 0;
    };

    deaths
        .as_slice()
        .iter()
        .filter_map(|death| match death {
            AMQPValue::FieldTable(entry) => Some(entry),
            _ => None,
        })
        .filter(|entry| {
            string_field(entry.inner().get("queue")).as_deref() == Some(retry_queue)
                && string_field(entry.inner().get("reason")).as_deref() == Some("expired")
        })
        .map(|entry| match entry.inner().get("count") {
            Some(AMQPValue::LongLongInt(count)) => *count as u32,
            Some(AMQPValue::LongInt(count)) => *count as u32,
            Some(AMQPValue::ShortInt(count)) => *count as u32,
            _ => 0,
        })
        .sum()
}

fn string_field(value: Option<&AMQPValue>) -> Option<String> {
    match value? {
        AMQPValue::LongString(s) => Some(s.to_string()),
        AMQPValue::ShortString(s) => Some(s.as_str().to_string()),
        _ => None,
    }
}
