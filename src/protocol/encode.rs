//! Frontend message encoding

use super::constants::{frontend, SSL_REQUEST_CODE};
use super::message::FrontendMessage;
use bytes::{BufMut, BytesMut};

/// Encode a frontend message into a fresh buffer
pub fn encode_message(msg: &FrontendMessage) -> BytesMut {
    let mut buf = BytesMut::with_capacity(64);
    encode_into(&mut buf, msg);
    buf
}

/// Append an encoded frontend message to `buf`
pub fn encode_into(buf: &mut BytesMut, msg: &FrontendMessage) {
    match msg {
        FrontendMessage::Startup { version, params } => framed(buf, None, |body| {
            body.put_i32(*version);
            for (key, value) in params {
                put_cstr(body, key);
                put_cstr(body, value);
            }
            body.put_u8(0);
        }),
        FrontendMessage::SslRequest => framed(buf, None, |body| {
            body.put_i32(SSL_REQUEST_CODE);
        }),
        FrontendMessage::Password(password) => {
            framed(buf, Some(frontend::PASSWORD), |body| put_cstr(body, password))
        }
        FrontendMessage::SaslInitialResponse { mechanism, data } => {
            framed(buf, Some(frontend::PASSWORD), |body| {
                put_cstr(body, mechanism);
                body.put_i32(data.len() as i32);
                body.put_slice(data);
            })
        }
        FrontendMessage::SaslResponse(data) => {
            framed(buf, Some(frontend::PASSWORD), |body| body.put_slice(data))
        }
        FrontendMessage::Query(sql) => {
            framed(buf, Some(frontend::QUERY), |body| put_cstr(body, sql))
        }
        FrontendMessage::Terminate => framed(buf, Some(frontend::TERMINATE), |_| {}),
    }
}

/// Write an optional tag, a length placeholder, the body, then patch the
/// length (which counts itself but not the tag).
fn framed(buf: &mut BytesMut, tag: Option<u8>, body: impl FnOnce(&mut BytesMut)) {
    if let Some(tag) = tag {
        buf.put_u8(tag);
    }
    let len_pos = buf.len();
    buf.put_i32(0);
    body(buf);
    let len = (buf.len() - len_pos) as i32;
    buf[len_pos..len_pos + 4].copy_from_slice(&len.to_be_bytes());
}

fn put_cstr(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}
