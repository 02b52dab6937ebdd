//! Backend message decoding

use super::constants::{auth, tags, MAX_MESSAGE_LENGTH};
use super::message::{AuthenticationMessage, BackendMessage, ErrorFields};
use bytes::Bytes;
use std::io;

/// Decode one backend message from the front of `data`.
///
/// Returns `Ok(None)` when `data` does not yet hold a complete message, and
/// `Ok(Some((msg, consumed)))` otherwise. The caller advances its buffer by
/// `consumed`. Malformed or oversized messages are `InvalidData` errors.
pub fn decode_message(data: &[u8]) -> io::Result<Option<(BackendMessage, usize)>> {
    if data.len() < 5 {
        return Ok(None);
    }

    let tag = data[0];
    let len = i32::from_be_bytes([data[1], data[2], data[3], data[4]]);
    if len < 4 {
        return Err(invalid(format!("invalid message length {}", len)));
    }
    let len = len as usize;
    if len > MAX_MESSAGE_LENGTH {
        return Err(invalid(format!(
            "message length {} exceeds maximum allowed {}",
            len, MAX_MESSAGE_LENGTH
        )));
    }
    if data.len() < len + 1 {
        return Ok(None);
    }

    let mut body = Reader::new(&data[5..len + 1]);
    let msg = match tag {
        tags::AUTHENTICATION => BackendMessage::Authentication(decode_authentication(&mut body)?),
        tags::BACKEND_KEY_DATA => BackendMessage::BackendKeyData {
            process_id: body.i32()?,
            secret_key: body.i32()?,
        },
        tags::COMMAND_COMPLETE => BackendMessage::CommandComplete(body.cstr()?),
        tags::DATA_ROW => decode_data_row(&mut body)?,
        tags::EMPTY_QUERY_RESPONSE => BackendMessage::EmptyQueryResponse,
        tags::ERROR_RESPONSE => BackendMessage::ErrorResponse(decode_error_fields(&mut body)?),
        tags::NOTICE_RESPONSE => BackendMessage::NoticeResponse(decode_error_fields(&mut body)?),
        tags::PARAMETER_STATUS => BackendMessage::ParameterStatus {
            name: body.cstr()?,
            value: body.cstr()?,
        },
        tags::READY_FOR_QUERY => BackendMessage::ReadyForQuery { status: body.u8()? },
        tags::ROW_DESCRIPTION => decode_row_description(&mut body)?,
        other => return Err(invalid(format!("unknown message tag: 0x{:02X}", other))),
    };

    Ok(Some((msg, len + 1)))
}

fn decode_authentication(body: &mut Reader<'_>) -> io::Result<AuthenticationMessage> {
    let code = body.i32()?;
    let msg = match code {
        auth::OK => AuthenticationMessage::Ok,
        auth::CLEARTEXT_PASSWORD => AuthenticationMessage::CleartextPassword,
        auth::MD5_PASSWORD => {
            let mut salt = [0u8; 4];
            salt.copy_from_slice(body.take(4)?);
            AuthenticationMessage::Md5Password { salt }
        }
        auth::SASL => {
            let mut mechanisms = Vec::new();
            while !body.is_empty() {
                let name = body.cstr()?;
                if name.is_empty() {
                    break;
                }
                mechanisms.push(name);
            }
            AuthenticationMessage::Sasl { mechanisms }
        }
        auth::SASL_CONTINUE => AuthenticationMessage::SaslContinue {
            data: body.rest().to_vec(),
        },
        auth::SASL_FINAL => AuthenticationMessage::SaslFinal {
            data: body.rest().to_vec(),
        },
        other => {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unsupported authentication request: {}", other),
            ))
        }
    };
    Ok(msg)
}

fn decode_data_row(body: &mut Reader<'_>) -> io::Result<BackendMessage> {
    let count = body.i16()?.max(0) as usize;
    let mut columns = Vec::with_capacity(count);
    for _ in 0..count {
        let len = body.i32()?;
        if len < 0 {
            columns.push(None);
        } else {
            columns.push(Some(Bytes::copy_from_slice(body.take(len as usize)?)));
        }
    }
    Ok(BackendMessage::DataRow(columns))
}

fn decode_row_description(body: &mut Reader<'_>) -> io::Result<BackendMessage> {
    let count = body.i16()?.max(0) as usize;
    let mut names = Vec::with_capacity(count);
    for _ in 0..count {
        names.push(body.cstr()?);
        // table oid, column attr, type oid, type size, type modifier, format
        body.take(18)?;
    }
    Ok(BackendMessage::RowDescription(names))
}

fn decode_error_fields(body: &mut Reader<'_>) -> io::Result<ErrorFields> {
    let mut fields = ErrorFields::default();
    loop {
        let field_type = body.u8()?;
        if field_type == 0 {
            break;
        }
        let value = body.cstr()?;
        match field_type {
            // `V` is the non-localized severity (9.6+); prefer it over `S`
            b'V' => fields.severity = Some(value),
            b'S' if fields.severity.is_none() => fields.severity = Some(value),
            b'C' => fields.code = Some(value),
            b'M' => fields.message = Some(value),
            b'D' => fields.detail = Some(value),
            b'H' => fields.hint = Some(value),
            _ => {}
        }
    }
    Ok(fields)
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Bounds-checked cursor over a message body
struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn take(&mut self, n: usize) -> io::Result<&'a [u8]> {
        if self.data.len() < n {
            return Err(invalid("message body truncated"));
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.data)
    }

    fn u8(&mut self) -> io::Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn i16(&mut self) -> io::Result<i16> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    fn i32(&mut self) -> io::Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn cstr(&mut self) -> io::Result<String> {
        let end = self
            .data
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| invalid("missing null terminator in string"))?;
        let s = String::from_utf8_lossy(&self.data[..end]).into_owned();
        self.data = &self.data[end + 1..];
        Ok(s)
    }
}
