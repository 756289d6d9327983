//! Command-line construction for `DepotDownloader`.

use bsm_core::BuildIdentity;

/// Value of one declared option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    /// `-key` when true, nothing when false.
    Flag(bool),
    /// `-key value` when non-empty, nothing when empty.
    Text(String),
    /// `-key value` when non-zero, nothing when zero.
    Number(u64),
    /// Undeclared, emits nothing.
    Unset,
}

impl ArgValue {
    fn is_set(&self) -> bool {
        match self {
            Self::Flag(on) => *on,
            Self::Text(text) => !text.is_empty(),
            Self::Number(n) => *n != 0,
            Self::Unset => false,
        }
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<u64> for ArgValue {
    fn from(value: u64) -> Self {
        Self::Number(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for ArgValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Unset, Into::into)
    }
}

/// Turn ordered `(key, value)` options into argv.
///
/// `true` becomes `-key`, a set non-boolean value becomes `-key value`, and
/// unset or falsy values are skipped. Output order follows input order.
pub fn build_args<K: AsRef<str>>(options: &[(K, ArgValue)]) -> Vec<String> {
    let mut args = Vec::with_capacity(options.len() * 2);
    for (key, value) in options {
        if !value.is_set() {
            continue;
        }
        args.push(format!("-{}", key.as_ref()));
        match value {
            ArgValue::Text(text) => args.push(text.clone()),
            ArgValue::Number(n) => args.push(n.to_string()),
            ArgValue::Flag(_) | ArgValue::Unset => {}
        }
    }
    args
}

/// Structured options of one `DepotDownloader` invocation.
///
/// The password is never part of argv; it is written to stdin when the
/// downloader prompts for it, so it does not show up in process listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepotArgs {
    pub app: String,
    pub depot: String,
    pub manifest: String,
    pub username: Option<String>,
    pub remember_password: bool,
    pub dir: String,
    pub validate: bool,
    pub qr: bool,
}

impl DepotArgs {
    /// Options for downloading `identity` into `dir`.
    ///
    /// Returns `None` when the identity carries no manifest id.
    pub fn for_build(
        app: impl Into<String>,
        depot: impl Into<String>,
        identity: &BuildIdentity,
        dir: impl Into<String>,
    ) -> Option<Self> {
        Some(Self {
            app: app.into(),
            depot: depot.into(),
            manifest: identity.manifest_id.clone()?,
            dir: dir.into(),
            ..Self::default()
        })
    }

    /// Options in the fixed order the downloader is always invoked with.
    pub fn options(&self) -> Vec<(&'static str, ArgValue)> {
        vec![
            ("app", self.app.as_str().into()),
            ("depot", self.depot.as_str().into()),
            ("manifest", self.manifest.as_str().into()),
            ("username", self.username.clone().into()),
            ("remember-password", self.remember_password.into()),
            ("dir", self.dir.as_str().into()),
            ("validate", self.validate.into()),
            ("qr", self.qr.into()),
        ]
    }

    pub fn to_args(&self) -> Vec<String> {
        build_args(&self.options())
    }
}
