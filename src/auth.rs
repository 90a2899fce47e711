//! Basic-authentication helpers on top of the connection pool.
//!
//! A thin consumer of the pool contract: the decoded credentials land in a
//! head-end block and stay there for the rest of the request cycle; the
//! server reclaims them with the pool reset at the next request boundary.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::pool::PoolError;
use crate::pool::arena::MemoryPool;

/// Credentials carried by an RFC 7617 `Authorization: Basic` header.
///
/// Both fields alias the pool they were decoded into and are valid until the
/// pool's next reset.
#[derive(Debug, PartialEq, Eq)]
pub struct BasicCredentials<'p> {
    pub username: &'p str,
    /// `None` when the decoded payload carries no `:` separator.
    pub password: Option<&'p str>,
}

#[derive(Debug)]
pub enum AuthError {
    /// The token68 payload is empty or not valid base64.
    BadEncoding,
    /// The decoded credentials are not UTF-8.
    BadUtf8,
    Pool(PoolError),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::BadEncoding => write!(f, "malformed Basic authorization payload"),
            AuthError::BadUtf8 => write!(f, "credentials are not valid UTF-8"),
            AuthError::Pool(e) => write!(f, "credential decoding failed: {e}"),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AuthError::Pool(e) => Some(e),
            AuthError::BadEncoding | AuthError::BadUtf8 => None,
        }
    }
}

impl From<PoolError> for AuthError {
    fn from(e: PoolError) -> Self {
        AuthError::Pool(e)
    }
}

/// Decode the token68 part of a `Basic` authorization header into `pool`.
///
/// The decoded bytes go into a head-end block sized by the decoder's
/// worst-case estimate, which is then shrunk in place to the exact decoded
/// length.  The payload is split at the first `:`; a payload without one
/// yields a username only.
///
/// # Errors
///
/// [`AuthError::BadEncoding`] for empty or malformed base64,
/// [`AuthError::BadUtf8`] for non-UTF-8 credentials, and
/// [`AuthError::Pool`] when the pool cannot hold the decoded payload.
pub fn decode_credentials<'p>(
    pool: &'p mut MemoryPool,
    token68: &str,
) -> Result<BasicCredentials<'p>, AuthError> {
    let estimate = base64::decoded_len_estimate(token68.len());
    let block = pool.alloc(estimate, false)?;
    // Safety: the block is `estimate` bytes and exclusive to this borrow.
    let buf = unsafe { std::slice::from_raw_parts_mut(block.as_ptr(), estimate) };

    let decoded_len = match STANDARD.decode_slice(token68, buf) {
        Ok(n) if n > 0 => n,
        _ => {
            tracing::debug!("discarding malformed Basic authorization payload");
            // Hand the scratch back; the block is the last one, so the
            // cursor rewinds in place.
            // Safety: the block was just allocated with `estimate` bytes.
            let _ = unsafe { pool.realloc(block, estimate, 0) };
            return Err(AuthError::BadEncoding);
        }
    };

    // Keep exactly the decoded bytes claimed.
    // Safety: same block, still sized `estimate`.
    let block = unsafe { pool.realloc(block, estimate, decoded_len) }?;
    // Safety: the shrunk block holds `decoded_len` bytes that live as long
    // as the pool borrow.
    let decoded = unsafe { std::slice::from_raw_parts(block.as_ptr(), decoded_len) };

    match decoded.iter().position(|&b| b == b':') {
        Some(i) => Ok(BasicCredentials {
            username: str::from_utf8(&decoded[..i]).map_err(|_| AuthError::BadUtf8)?,
            password: Some(str::from_utf8(&decoded[i + 1..]).map_err(|_| AuthError::BadUtf8)?),
        }),
        None => Ok(BasicCredentials {
            username: str::from_utf8(decoded).map_err(|_| AuthError::BadUtf8)?,
            password: None,
        }),
    }
}

/// Build the `WWW-Authenticate` value that asks a client for Basic
/// credentials.
///
/// The realm is quoted per RFC 7617; `prefer_utf8` appends the
/// `charset="UTF-8"` parameter telling the client UTF-8 credentials are
/// welcome.
#[must_use]
pub fn challenge(realm: &str, prefer_utf8: bool) -> String {
    const PREFIX: &str = "Basic realm=\"";
    const SUFFIX_CHARSET: &str = "\", charset=\"UTF-8\"";
    let mut value = String::with_capacity(PREFIX.len() + realm.len() * 2 + SUFFIX_CHARSET.len());
    value.push_str(PREFIX);
    for ch in realm.chars() {
        if matches!(ch, '"' | '\\') {
            value.push('\\');
        }
        value.push(ch);
    }
    if prefer_utf8 {
        value.push_str(SUFFIX_CHARSET);
    } else {
        value.push('"');
    }
    value
}
