//! Shared-access signature tokens.
//!
//! A token proves possession of the device key without sending it:
//!
//! ```text
//! sig = base64( HMAC-SHA256( base64decode(key), urlencode(resource) + "\n" + expiry ) )
//! SharedAccessSignature sr=<urlencode(resource)>&sig=<urlencode(sig)>&se=<expiry>
//! ```

use crate::error::{Error, Result};

const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Build a SAS token for `resource` (e.g. `hub.example.net/devices/dev1`)
/// valid until `expiry` (Unix seconds).
pub fn generate_token(resource: &str, key_base64: &str, expiry: u64) -> Result<String> {
    let key = base64_decode(key_base64).map_err(|_| Error::Config("SharedAccessKey is not valid base64"))?;
    if key.is_empty() {
        return Err(Error::Config("SharedAccessKey is empty"));
    }

    let encoded_resource = url_encode(resource);
    let string_to_sign = format!("{encoded_resource}\n{expiry}");
    let mac = hmac_sha256::HMAC::mac(string_to_sign.as_bytes(), &key);
    let sig = base64_encode(&mac);

    Ok(format!(
        "SharedAccessSignature sr={}&sig={}&se={}",
        encoded_resource,
        url_encode(&sig),
        expiry
    ))
}

/// Standard-alphabet base64 with padding.
pub fn base64_encode(input: &[u8]) -> String {
    let mut out = String::with_capacity(input.len().div_ceil(3) * 4);
    for chunk in input.chunks(3) {
        let b = [
            chunk[0],
            chunk.get(1).copied().unwrap_or(0),
            chunk.get(2).copied().unwrap_or(0),
        ];
        let n = (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]);
        out.push(BASE64_ALPHABET[(n >> 18) as usize & 0x3F] as char);
        out.push(BASE64_ALPHABET[(n >> 12) as usize & 0x3F] as char);
        if chunk.len() > 1 {
            out.push(BASE64_ALPHABET[(n >> 6) as usize & 0x3F] as char);
        } else {
            out.push('=');
        }
        if chunk.len() > 2 {
            out.push(BASE64_ALPHABET[n as usize & 0x3F] as char);
        } else {
            out.push('=');
        }
    }
    out
}

/// Decode standard-alphabet base64.  Padding is optional.
pub fn base64_decode(input: &str) -> core::result::Result<Vec<u8>, &'static str> {
    let input = input.trim_end_matches('=');
    let mut output = Vec::with_capacity(input.len() * 3 / 4);
    let mut buffer: u32 = 0;
    let mut bits: u8 = 0;

    for c in input.bytes() {
        let value = match c {
            b'A'..=b'Z' => c - b'A',
            b'a'..=b'z' => c - b'a' + 26,
            b'0'..=b'9' => c - b'0' + 52,
            b'+' => 62,
            b'/' => 63,
            _ => return Err("invalid base64 character"),
        };
        buffer = (buffer << 6) | u32::from(value);
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            output.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }
    Ok(output)
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
pub fn url_encode(input: &str) -> String {
    urlencoding::encode(input).into_owned()
}

/// Reverse of [`url_encode`]; also maps `+` to space.  Invalid escapes are
/// kept verbatim and invalid UTF-8 is replaced.
pub fn url_decode(input: &str) -> String {
    let spaced = input.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}
