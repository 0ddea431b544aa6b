//! Security header codec for the gateway ↔ upstream hop.
//!
//! # Responsibilities
//! - Define the fixed `x-ca-*` header vocabulary
//! - Encode a header set onto an outbound request
//! - Decode an inbound header set, enforcing a caller-chosen required subset
//!
//! # Design Decisions
//! - Wire names come from a constant table on the enum, no dynamic dispatch
//! - Unrecognized incoming headers are ignored, never an error
//! - Which headers are required is caller policy, not fixed here

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::error::MissingHeaderError;

/// The three security header slots exchanged with the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityHeader {
    /// Whether the payload between gateway and upstream is encrypted.
    Encrypt,
    /// Correlation id assigned at admission.
    RequestId,
    /// Admission timestamp (seconds since the Unix epoch).
    RequestTime,
}

impl SecurityHeader {
    /// Wire name, fixed prefix `x-ca-`.
    pub const fn wire_name(self) -> &'static str {
        match self {
            SecurityHeader::Encrypt => "x-ca-encrypt",
            SecurityHeader::RequestId => "x-ca-reqid",
            SecurityHeader::RequestTime => "x-ca-reqtime",
        }
    }

    pub const ALL: [SecurityHeader; 3] = [
        SecurityHeader::Encrypt,
        SecurityHeader::RequestId,
        SecurityHeader::RequestTime,
    ];
}

/// Values for the security header slots. Unset slots are omitted on encode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityHeaderSet {
    pub encrypt: Option<String>,
    pub request_id: Option<String>,
    pub request_time: Option<String>,
}

impl SecurityHeaderSet {
    fn slot(&self, header: SecurityHeader) -> &Option<String> {
        match header {
            SecurityHeader::Encrypt => &self.encrypt,
            SecurityHeader::RequestId => &self.request_id,
            SecurityHeader::RequestTime => &self.request_time,
        }
    }

    fn slot_mut(&mut self, header: SecurityHeader) -> &mut Option<String> {
        match header {
            SecurityHeader::Encrypt => &mut self.encrypt,
            SecurityHeader::RequestId => &mut self.request_id,
            SecurityHeader::RequestTime => &mut self.request_time,
        }
    }

    /// Render the set slots into HTTP headers.
    ///
    /// Values that are not valid header values (control bytes) are dropped;
    /// header values here are gateway-generated, so this does not occur in
    /// practice.
    pub fn encode(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for header in SecurityHeader::ALL {
            if let Some(value) = self.slot(header) {
                if let Ok(value) = HeaderValue::from_str(value) {
                    headers.insert(HeaderName::from_static(header.wire_name()), value);
                }
            }
        }
        headers
    }

    /// Apply the set slots onto an existing header map (outbound injection).
    pub fn apply(&self, headers: &mut HeaderMap) {
        for (name, value) in self.encode() {
            if let Some(name) = name {
                headers.insert(name, value);
            }
        }
    }

    /// Read the security slots out of an incoming header map.
    ///
    /// Headers outside the `x-ca-*` vocabulary are ignored. Fails only when
    /// one of the caller's `required` headers is absent.
    pub fn decode(
        headers: &HeaderMap,
        required: &[SecurityHeader],
    ) -> Result<Self, MissingHeaderError> {
        let mut set = SecurityHeaderSet::default();
        for header in SecurityHeader::ALL {
            if let Some(value) = headers.get(header.wire_name()) {
                if let Ok(value) = value.to_str() {
                    *set.slot_mut(header) = Some(value.to_string());
                }
            }
        }

        for &header in required {
            if set.slot(header).is_none() {
                return Err(MissingHeaderError(header.wire_name()));
            }
        }

        Ok(set)
    }
}
