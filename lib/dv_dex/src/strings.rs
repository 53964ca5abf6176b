use crate::errors::DexResult;
use crate::{Dex, PrettyPrint};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An entry of the string table. Strings are kept decoded, the MUTF-8 storage
/// of the binary container being out of the model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StringIdItem(String);

impl StringIdItem {
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StringIdItem {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PrettyPrint for StringIdItem {
    fn pp(&self, f: &mut fmt::Formatter, _dex: &Dex) -> DexResult<()> {
        write!(f, "{:?}", self.0)?;
        Ok(())
    }
}
