//! Event framing
//!
//! ```text
//! {"type": "...", "version": "...", "data_length": N, "payload_length": M}\n
//! <N bytes of JSON data><M bytes of binary payload>
//! ```
//!
//! `data` may also be sent inline in the header; a separate data segment is
//! merged over it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::TransportError;

/// Protocol version written into every header
pub const PROTOCOL_VERSION: &str = "1.5.4";

/// Upper bound on a header line
const MAX_HEADER_BYTES: u64 = 64 * 1024;

/// Upper bound on a data segment
const MAX_DATA_BYTES: usize = 1024 * 1024;

/// Upper bound on a binary payload
const MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

/// One protocol event
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: String,
    pub data: Map<String, Value>,
    pub payload: Option<Bytes>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload_length: Option<usize>,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: Map::new(),
            payload: None,
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_payload(mut self, payload: Bytes) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn is(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }
}

/// Read the next event; `Ok(None)` on a clean end of stream
pub async fn read_event<R>(reader: &mut R) -> Result<Option<Event>, TransportError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let read = (&mut *reader)
        .take(MAX_HEADER_BYTES)
        .read_until(b'\n', &mut line)
        .await?;

    if read == 0 {
        return Ok(None);
    }
    if line.last() != Some(&b'\n') {
        if read as u64 >= MAX_HEADER_BYTES {
            return Err(TransportError::Malformed("header line too long".to_string()));
        }
        return Err(TransportError::Closed);
    }

    let header: Header = serde_json::from_slice(&line)?;
    let mut data = header.data.unwrap_or_default();

    if let Some(len) = header.data_length.filter(|&l| l > 0) {
        if len > MAX_DATA_BYTES {
            return Err(TransportError::Malformed(format!("data segment of {} bytes", len)));
        }
        let mut buf = vec![0u8; len];
        read_exact(reader, &mut buf).await?;
        let extra: Map<String, Value> = serde_json::from_slice(&buf)?;
        data.extend(extra);
    }

    let payload = match header.payload_length.filter(|&l| l > 0) {
        Some(len) if len > MAX_PAYLOAD_BYTES => {
            return Err(TransportError::Malformed(format!("payload of {} bytes", len)));
        }
        Some(len) => {
            let mut buf = vec![0u8; len];
            read_exact(reader, &mut buf).await?;
            Some(Bytes::from(buf))
        }
        None => None,
    };

    Ok(Some(Event {
        event_type: header.event_type,
        data,
        payload,
    }))
}

async fn read_exact<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), TransportError>
where
    R: AsyncBufRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(TransportError::Closed),
        Err(e) => Err(e.into()),
    }
}

/// Write one event and flush
pub async fn write_event<W>(writer: &mut W, event: &Event) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let data = if event.data.is_empty() {
        None
    } else {
        Some(serde_json::to_vec(&event.data)?)
    };

    let header = Header {
        event_type: event.event_type.clone(),
        data: None,
        version: Some(PROTOCOL_VERSION.to_string()),
        data_length: data.as_ref().map(|d| d.len()),
        payload_length: event.payload.as_ref().map(|p| p.len()).filter(|&l| l > 0),
    };

    let mut frame = serde_json::to_vec(&header)?;
    frame.push(b'\n');
    if let Some(data) = data {
        frame.extend_from_slice(&data);
    }
    writer.write_all(&frame).await?;

    if let Some(payload) = event.payload.as_ref().filter(|p| !p.is_empty()) {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let event = Event::new("audio-chunk")
            .with_data(map(json!({"rate": 22050, "width": 2, "channels": 1})))
            .with_payload(Bytes::from_static(&[1, 2, 3, 4]));

        let mut buf = Vec::new();
        write_event(&mut buf, &event).await.unwrap();

        let newline = buf.iter().position(|&b| b == b'\n').unwrap();
        let header: Value = serde_json::from_slice(&buf[..newline]).unwrap();
        assert_eq!(header["type"], "audio-chunk");
        assert_eq!(header["payload_length"], 4);
        assert!(header.get("data").is_none());

        let mut reader = buf.as_slice();
        let decoded = read_event(&mut reader).await.unwrap().unwrap();
        assert_eq!(decoded, event);
        assert!(read_event(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inline_data_is_merged() {
        let raw = b"{\"type\":\"info\",\"data\":{\"a\":1,\"b\":1},\"data_length\":8}\n{\"b\":2}\n";
        // data_length covers `{"b":2}` plus the trailing newline
        let mut reader: &[u8] = raw;
        let event = read_event(&mut reader).await.unwrap().unwrap();
        assert_eq!(event.data["a"], 1);
        assert_eq!(event.data["b"], 2);
        assert!(event.payload.is_none());
    }

    #[tokio::test]
    async fn test_event_without_data() {
        let mut buf = Vec::new();
        write_event(&mut buf, &Event::new("describe")).await.unwrap();
        let line = String::from_utf8(buf.clone()).unwrap();
        assert!(!line.contains("data_length"));
        assert!(!line.contains("payload_length"));

        let mut reader = buf.as_slice();
        let event = read_event(&mut reader).await.unwrap().unwrap();
        assert!(event.is("describe"));
        assert!(event.data.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_payload_is_closed() {
        let raw = b"{\"type\":\"audio-chunk\",\"payload_length\":10}\nabc";
        let mut reader: &[u8] = raw;
        let err = read_event(&mut reader).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn test_garbage_header_is_malformed() {
        let mut reader: &[u8] = b"not json\n";
        let err = read_event(&mut reader).await.unwrap_err();
        assert!(err.is_malformed());
    }
}
