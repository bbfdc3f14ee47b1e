//! HTTP vocabulary shared by requests and transports.
//!
//! Methods and headers are plain data. Header keys are unique and their order
//! carries no meaning, so a `HashMap` is the mapping of record.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SinetError;

/// Header mapping for requests and responses.
pub type Headers = HashMap<String, String>;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Head,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = SinetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: [Method; 6] = [
            Method::Get,
            Method::Post,
            Method::Put,
            Method::Delete,
            Method::Head,
            Method::Patch,
        ];
        let s = s.trim();
        ALL.into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| SinetError::InvalidMethod(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!(" Delete ".parse::<Method>().unwrap(), Method::Delete);
        assert_eq!("PATCH".parse::<Method>().unwrap(), Method::Patch);
    }

    #[test]
    fn rejects_unknown_method() {
        let err = "BREW".parse::<Method>().unwrap_err();
        assert!(matches!(err, SinetError::InvalidMethod(ref m) if m == "BREW"));
    }

    #[test]
    fn display_matches_wire_token() {
        assert_eq!(Method::Post.to_string(), "POST");
        assert_eq!(Method::default(), Method::Get);
    }
}
