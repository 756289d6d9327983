//! DepotDownloader line-protocol event model.
//!
//! The external downloader prints lines such as `[Info]|[Progress]|42,5`.
//! Each line maps to a category plus a subtype drawn from a closed, per-category
//! table. The tables below are the only tokens the parser accepts.

use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString, IntoStaticStr};

use crate::errors::ErrorCategory;

/// Top-level category of a protocol line.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, IntoStaticStr,
)]
pub enum EventCategory {
    Info,
    Warning,
    Error,
}

/// Informational subtypes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    IntoStaticStr,
    EnumIter,
)]
pub enum InfoEvent {
    Start,
    Password,
    Guard,
    #[strum(serialize = "2FA")]
    #[serde(rename = "2FA")]
    TwoFa,
    Progress,
    Validated,
    Finished,
    #[strum(serialize = "SteamID")]
    #[serde(rename = "SteamID")]
    SteamId,
    #[strum(serialize = "QRCode")]
    #[serde(rename = "QRCode")]
    QrCode,
    MobileApp,
}

/// Error subtypes. Every one of these is fatal to the download.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    IntoStaticStr,
    EnumIter,
)]
pub enum ErrorEvent {
    Password,
    InvalidCredentials,
    NoManifest,
    DirectoryCreate,
    NotAvailableApp,
    DepotNotFound,
    NotCompleted,
    InvalidManifest,
    #[strum(serialize = "NoValidKey")]
    #[serde(rename = "NoValidKey")]
    NoValidKeys,
    NoManifestCode,
    #[strum(serialize = "401")]
    #[serde(rename = "401")]
    Unauthorized,
    #[strum(serialize = "404")]
    #[serde(rename = "404")]
    NotFound,
    NoServer,
    SteamLib,
    NotAllowed,
    ConnectionTimeout,
    ConnectionError,
    TokenRejected,
    LicenceError,
    AccessDenied,
    Unknown,
}

impl ErrorEvent {
    /// Wire token, also used as the stable error code.
    pub fn token(self) -> &'static str {
        self.into()
    }

    /// Which family of failure this subtype belongs to.
    pub const fn category(self) -> ErrorCategory {
        match self {
            Self::Password
            | Self::InvalidCredentials
            | Self::Unauthorized
            | Self::TokenRejected
            | Self::AccessDenied
            | Self::NotAllowed
            | Self::LicenceError => ErrorCategory::Authentication,
            Self::NoManifest
            | Self::NotAvailableApp
            | Self::DepotNotFound
            | Self::NoManifestCode
            | Self::NotFound
            | Self::NoServer
            | Self::ConnectionTimeout
            | Self::ConnectionError => ErrorCategory::Transport,
            Self::DirectoryCreate => ErrorCategory::Io,
            Self::NotCompleted => ErrorCategory::Integrity,
            Self::InvalidManifest | Self::NoValidKeys | Self::SteamLib | Self::Unknown => {
                ErrorCategory::Protocol
            }
        }
    }
}

/// Non-fatal warning subtypes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    IntoStaticStr,
    EnumIter,
)]
pub enum WarningEvent {
    ManifestChecksum,
    ConnectionTimeout,
    Unknown,
}

/// A category together with one of its subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "subType")]
pub enum DepotEventKind {
    Info(InfoEvent),
    Warning(WarningEvent),
    Error(ErrorEvent),
}

impl DepotEventKind {
    /// Resolve a category token and optional subtype token against the closed tables.
    ///
    /// A missing subtype resolves to the category's `Unknown` member when it
    /// has one; `Info` has none, so `[Info]|payload` is unrecognized.
    pub fn resolve(category: &str, subtype: Option<&str>) -> Option<Self> {
        let category: EventCategory = category.parse().ok()?;
        match (category, subtype) {
            (EventCategory::Info, Some(sub)) => sub.parse().ok().map(Self::Info),
            (EventCategory::Info, None) => None,
            (EventCategory::Warning, Some(sub)) => sub.parse().ok().map(Self::Warning),
            (EventCategory::Warning, None) => Some(Self::Warning(WarningEvent::Unknown)),
            (EventCategory::Error, Some(sub)) => sub.parse().ok().map(Self::Error),
            (EventCategory::Error, None) => Some(Self::Error(ErrorEvent::Unknown)),
        }
    }

    /// Category of this event.
    pub const fn category(self) -> EventCategory {
        match self {
            Self::Info(_) => EventCategory::Info,
            Self::Warning(_) => EventCategory::Warning,
            Self::Error(_) => EventCategory::Error,
        }
    }

    /// Subtype wire token.
    pub fn subtype_token(self) -> &'static str {
        match self {
            Self::Info(sub) => sub.into(),
            Self::Warning(sub) => sub.into(),
            Self::Error(sub) => sub.into(),
        }
    }
}

/// One recognized protocol line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepotEvent {
    #[serde(flatten)]
    pub kind: DepotEventKind,
    /// Free-text payload, trimmed; `None` when the line carried none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl DepotEvent {
    pub const fn new(kind: DepotEventKind, data: Option<String>) -> Self {
        Self { kind, data }
    }

    /// Whether this is the given informational subtype.
    pub fn is_info(&self, sub: InfoEvent) -> bool {
        self.kind == DepotEventKind::Info(sub)
    }
}
