use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Negotiated WebSocket subprotocol. Clients that do not request it are
/// served with the same framing anyway.
pub const SUBPROTOCOL: &str = "gotty";

/// WebSocket close code for protocol violations.
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;

// Every message is one text frame whose first byte is an ASCII type tag.

/// Server to client: raw PTY output, base64-tunneled for UTF-8 safety.
pub const MSG_OUTPUT: u8 = b'0';
/// Server to client: init payload when non-empty, pong when empty.
pub const MSG_INIT: u8 = b'1';

/// Client to server: bytes for the child's stdin.
pub const MSG_INPUT: u8 = b'0';
/// Client to server: liveness ping, answered with an empty-payload pong.
pub const MSG_PING: u8 = b'1';
/// Client to server: window resize request.
pub const MSG_RESIZE: u8 = b'2';

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty frame")]
    EmptyFrame,
    #[error("unknown frame tag {0:#04x}")]
    UnknownTag(u8),
    #[error("malformed resize payload: {0}")]
    MalformedResize(#[from] serde_json::Error),
}

/// A decoded client frame.
#[derive(Debug, PartialEq, Eq)]
pub enum ClientFrame {
    Input(Vec<u8>),
    Ping,
    Resize { columns: u16, rows: u16 },
}

#[derive(Deserialize)]
struct ResizePayload {
    columns: u16,
    rows: u16,
}

#[derive(Serialize)]
struct InitPayload<'a> {
    #[serde(rename = "Title")]
    title: &'a str,
    #[serde(rename = "Preferences")]
    preferences: &'a Value,
}

pub fn decode_client(frame: &[u8]) -> Result<ClientFrame, ProtocolError> {
    let (&tag, payload) = frame.split_first().ok_or(ProtocolError::EmptyFrame)?;
    match tag {
        MSG_INPUT => Ok(ClientFrame::Input(payload.to_vec())),
        MSG_PING => Ok(ClientFrame::Ping),
        MSG_RESIZE => {
            let resize: ResizePayload = serde_json::from_slice(payload)?;
            Ok(ClientFrame::Resize {
                columns: resize.columns,
                rows: resize.rows,
            })
        }
        other => Err(ProtocolError::UnknownTag(other)),
    }
}

pub fn encode_output(data: &[u8]) -> String {
    let mut frame = String::with_capacity(1 + data.len() * 4 / 3 + 4);
    frame.push(MSG_OUTPUT as char);
    BASE64.encode_string(data, &mut frame);
    frame
}

pub fn encode_init(title: &str, preferences: &Value) -> serde_json::Result<String> {
    let payload = serde_json::to_string(&InitPayload { title, preferences })?;
    Ok(format!("{}{}", MSG_INIT as char, payload))
}

pub fn encode_pong() -> String {
    (MSG_INIT as char).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_input() {
        let frame = decode_client(b"0hello\n").unwrap();
        assert_eq!(frame, ClientFrame::Input(b"hello\n".to_vec()));
    }

    #[test]
    fn test_decode_input_empty_payload() {
        let frame = decode_client(b"0").unwrap();
        assert_eq!(frame, ClientFrame::Input(Vec::new()));
    }

    #[test]
    fn test_decode_ping() {
        assert_eq!(decode_client(b"1").unwrap(), ClientFrame::Ping);
    }

    #[test]
    fn test_decode_resize() {
        let frame = decode_client(br#"2{"columns":120,"rows":40}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Resize {
                columns: 120,
                rows: 40
            }
        );
    }

    #[test]
    fn test_decode_malformed_resize() {
        assert!(matches!(
            decode_client(b"2{not json"),
            Err(ProtocolError::MalformedResize(_))
        ));
    }

    #[test]
    fn test_decode_unknown_tag() {
        assert!(matches!(
            decode_client(b"9whatever"),
            Err(ProtocolError::UnknownTag(b'9'))
        ));
    }

    #[test]
    fn test_decode_empty_frame() {
        assert!(matches!(decode_client(b""), Err(ProtocolError::EmptyFrame)));
    }

    #[test]
    fn test_encode_output_is_base64_tagged() {
        let frame = encode_output(b"hi\n");
        assert_eq!(frame.as_bytes()[0], MSG_OUTPUT);
        assert_eq!(BASE64.decode(&frame[1..]).unwrap(), b"hi\n");
    }

    #[test]
    fn test_encode_init_shape() {
        let prefs = serde_json::json!({ "font_size": 14 });
        let frame = encode_init("GoTTY - cat (host)", &prefs).unwrap();
        assert_eq!(frame.as_bytes()[0], MSG_INIT);
        let payload: Value = serde_json::from_str(&frame[1..]).unwrap();
        assert_eq!(payload["Title"], "GoTTY - cat (host)");
        assert_eq!(payload["Preferences"]["font_size"], 14);
    }

    #[test]
    fn test_encode_pong_is_empty_payload() {
        assert_eq!(encode_pong(), "1");
    }
}
