//! Fixed-size handshake wire format (§6). Manually encoded with
//! `to_be_bytes`/`from_be_bytes` rather than a framing crate: the layout is
//! small, fixed, and exactly specified byte-for-byte, so a derive macro
//! would buy nothing a few explicit reads/writes don't already give.

pub const MAGIC: u32 = 0x4D43_5042; // "MCPB"
pub const VERSION: u16 = 1;

pub const TOKEN_LEN: usize = 32;
pub const REQUEST_LEN: usize = 4 + 2 + 2 + TOKEN_LEN + TOKEN_LEN;
pub const RESPONSE_LEN: usize = 4 + 2 + 4 + TOKEN_LEN + 4 + 4;

const FLAG_HAS_RESUME_TOKEN: u16 = 0b01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Status {
    Ok = 0,
    BadMagic = 1,
    BadVersion = 2,
    TokenExpired = 3,
    TokenUnknown = 4,
    Full = 5,
    Internal = 6,
}

impl Status {
    /// Whether the client should delete its persisted resume token and
    /// retry exactly once with `flags=0` (§6).
    pub fn triggers_resume_token_retry(self) -> bool {
        matches!(self, Status::TokenExpired | Status::TokenUnknown)
    }
}

#[derive(Debug, Clone)]
pub struct HandshakeRequest {
    pub resume_token: Option<[u8; TOKEN_LEN]>,
    pub secret_token: [u8; TOKEN_LEN],
}

#[derive(Debug, Clone, Copy)]
pub struct HandshakeResponse {
    pub status: Status,
    pub resume_token: [u8; TOKEN_LEN],
    pub idle_ttl_secs: u32,
    pub abs_ttl_secs: u32,
}

impl HandshakeRequest {
    /// Parse a raw `REQUEST_LEN`-byte buffer. Returns `None` only for a
    /// structurally wrong-sized buffer — `magic`/`version` mismatches are
    /// reported via the handshake response's status, not by failing to
    /// parse, so the broker can still answer with a well-formed rejection.
    pub fn parse(buf: &[u8]) -> Option<(u32, u16, Self)> {
        if buf.len() != REQUEST_LEN {
            return None;
        }
        let magic = u32::from_be_bytes(buf[0..4].try_into().ok()?);
        let version = u16::from_be_bytes(buf[4..6].try_into().ok()?);
        let flags = u16::from_be_bytes(buf[6..8].try_into().ok()?);
        let mut resume_token = [0u8; TOKEN_LEN];
        resume_token.copy_from_slice(&buf[8..8 + TOKEN_LEN]);
        let mut secret_token = [0u8; TOKEN_LEN];
        secret_token.copy_from_slice(&buf[8 + TOKEN_LEN..8 + 2 * TOKEN_LEN]);

        let resume_token = if flags & FLAG_HAS_RESUME_TOKEN != 0 {
            Some(resume_token)
        } else {
            None
        };

        Some((
            magic,
            version,
            Self {
                resume_token,
                secret_token,
            },
        ))
    }

    pub fn to_bytes(&self) -> [u8; REQUEST_LEN] {
        let mut buf = [0u8; REQUEST_LEN];
        buf[0..4].copy_from_slice(&MAGIC.to_be_bytes());
        buf[4..6].copy_from_slice(&VERSION.to_be_bytes());
        let flags: u16 = if self.resume_token.is_some() {
            FLAG_HAS_RESUME_TOKEN
        } else {
            0
        };
        buf[6..8].copy_from_slice(&flags.to_be_bytes());
        if let Some(t) = self.resume_token {
            buf[8..8 + TOKEN_LEN].copy_from_slice(&t);
        }
        buf[8 + TOKEN_LEN..8 + 2 * TOKEN_LEN].copy_from_slice(&self.secret_token);
        buf
    }
}

impl HandshakeResponse {
    pub fn to_bytes(&self) -> [u8; RESPONSE_LEN] {
        let mut buf = [0u8; RESPONSE_LEN];
        buf[0..4].copy_from_slice(&MAGIC.to_be_bytes());
        buf[4..6].copy_from_slice(&VERSION.to_be_bytes());
        buf[6..10].copy_from_slice(&(self.status as u32).to_be_bytes());
        buf[10..10 + TOKEN_LEN].copy_from_slice(&self.resume_token);
        let rest = 10 + TOKEN_LEN;
        buf[rest..rest + 4].copy_from_slice(&self.idle_ttl_secs.to_be_bytes());
        buf[rest + 4..rest + 8].copy_from_slice(&self.abs_ttl_secs.to_be_bytes());
        buf
    }

    pub fn rejection(status: Status) -> Self {
        Self {
            status,
            resume_token: [0u8; TOKEN_LEN],
            idle_ttl_secs: 0,
            abs_ttl_secs: 0,
        }
    }
}
