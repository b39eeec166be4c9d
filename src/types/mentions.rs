//! Allow-list controlling which mentions in a message actually ping.

use std::collections::BTreeSet;

use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Which mentions the server should resolve when delivering a message.
///
/// Explicit user or role ids take precedence over the blanket "parse all
/// users/roles" switches: adding an id turns the matching switch off, and
/// turning a switch on clears the ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedMentions {
    parse_users: bool,
    parse_roles: bool,
    parse_everyone: bool,
    users: BTreeSet<String>,
    roles: BTreeSet<String>,
}

impl AllowedMentions {
    /// Every mention pings (the default).
    pub fn all() -> Self {
        Self {
            parse_users: true,
            parse_roles: true,
            parse_everyone: true,
            users: BTreeSet::new(),
            roles: BTreeSet::new(),
        }
    }

    /// No mention pings.
    pub fn none() -> Self {
        Self {
            parse_users: false,
            parse_roles: false,
            parse_everyone: false,
            users: BTreeSet::new(),
            roles: BTreeSet::new(),
        }
    }

    pub fn users<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.users.extend(ids.into_iter().map(Into::into));
        self.parse_users = false;
        self
    }

    pub fn roles<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(ids.into_iter().map(Into::into));
        self.parse_roles = false;
        self
    }

    pub fn allow_everyone(mut self, allow: bool) -> Self {
        self.parse_everyone = allow;
        self
    }

    pub fn allow_users(mut self, allow: bool) -> Self {
        self.parse_users = allow;
        if allow {
            self.users.clear();
        }
        self
    }

    pub fn allow_roles(mut self, allow: bool) -> Self {
        self.parse_roles = allow;
        if allow {
            self.roles.clear();
        }
        self
    }

    /// Values for the wire `parse` array.
    fn parse_list(&self) -> Vec<&'static str> {
        let mut parse = Vec::with_capacity(3);
        if self.users.is_empty() && self.parse_users {
            parse.push("users");
        }
        if self.roles.is_empty() && self.parse_roles {
            parse.push("roles");
        }
        if self.parse_everyone {
            parse.push("everyone");
        }
        parse
    }
}

impl Default for AllowedMentions {
    fn default() -> Self {
        Self::all()
    }
}

impl Serialize for AllowedMentions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = 1 + usize::from(!self.users.is_empty()) + usize::from(!self.roles.is_empty());
        let mut state = serializer.serialize_struct("AllowedMentions", len)?;
        state.serialize_field("parse", &self.parse_list())?;
        if !self.users.is_empty() {
            state.serialize_field("users", &self.users)?;
        }
        if !self.roles.is_empty() {
            state.serialize_field("roles", &self.roles)?;
        }
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use serde_test::{assert_ser_tokens, Token};

    #[test]
    fn all_mentions_parse_everything() {
        let value = serde_json::to_value(AllowedMentions::all()).unwrap();
        assert_eq!(value, json!({ "parse": ["users", "roles", "everyone"] }));
    }

    #[test]
    fn no_mentions_tokens() {
        assert_ser_tokens(
            &AllowedMentions::none(),
            &[
                Token::Struct {
                    name: "AllowedMentions",
                    len: 1,
                },
                Token::Str("parse"),
                Token::Seq { len: Some(0) },
                Token::SeqEnd,
                Token::StructEnd,
            ],
        );
    }

    #[test]
    fn explicit_ids_replace_parse_switches() {
        let mentions = AllowedMentions::all().users(["42", "7"]).roles(["99"]);
        let value = serde_json::to_value(mentions).unwrap();
        assert_eq!(
            value,
            json!({ "parse": ["everyone"], "users": ["42", "7"], "roles": ["99"] })
        );
    }

    #[test]
    fn allowing_users_clears_ids() {
        let mentions = AllowedMentions::none().users(["1"]).allow_users(true);
        let value = serde_json::to_value(mentions).unwrap();
        assert_eq!(value, json!({ "parse": ["users"] }));
    }
}
