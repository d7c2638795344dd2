// src/types.rs
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Kind of a certstream frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    CertificateUpdate,
    Heartbeat,
    /// Any kind this crate does not know about; forwarded like an update
    #[serde(other)]
    Unknown,
}

/// One certificate-transparency log event as received from the feed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(rename = "message_type", default)]
    pub kind: MessageKind,

    #[serde(default)]
    pub data: EntryData,

    /// Registrable domain, filled in during matching
    #[serde(default)]
    pub domain: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryData {
    pub cert_index: u64,
    pub cert_link: String,
    pub leaf_cert: LeafCert,

    /// Unix timestamp (fractional seconds) when the feed observed the cert
    pub seen: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeafCert {
    #[serde(deserialize_with = "null_as_default")]
    pub all_domains: Vec<String>,
    pub subject: Subject,
    #[serde(deserialize_with = "null_as_default")]
    pub extensions: serde_json::Map<String, serde_json::Value>,
    pub not_before: i64,
    pub not_after: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Subject {
    #[serde(alias = "C")]
    pub c: Option<String>,
    #[serde(alias = "CN")]
    pub cn: Option<String>,
    pub aggregated: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Entry {
    pub fn is_heartbeat(&self) -> bool {
        self.kind == MessageKind::Heartbeat
    }

    /// Subject common name, empty when the certificate carries none
    pub fn common_name(&self) -> &str {
        self.data.leaf_cert.subject.cn.as_deref().unwrap_or("")
    }
}

/// A matched entry together with its canonical JSON form
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    entry: Entry,
    payload: String,
}

impl Match {
    /// Build a match from an entry whose domain is on the watch-list.
    ///
    /// A serialization failure is handed back next to the match instead of
    /// replacing it; the match then carries an empty payload.
    pub fn from_entry(entry: Entry) -> (Self, Option<serde_json::Error>) {
        match serde_json::to_string(&entry) {
            Ok(payload) => (Self { entry, payload }, None),
            Err(e) => (
                Self {
                    entry,
                    payload: String::new(),
                },
                Some(e),
            ),
        }
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Registrable domain the match was recorded under
    pub fn domain(&self) -> &str {
        &self.entry.domain
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[+] Match: {}", self.entry.domain)?;
        if !self.entry.data.leaf_cert.all_domains.is_empty() {
            write!(f, " ({})", self.entry.data.leaf_cert.all_domains.join(", "))?;
        }
        Ok(())
    }
}
