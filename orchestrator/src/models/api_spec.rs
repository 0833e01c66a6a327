//! Machine-readable API specification produced alongside a generated project

use serde::{Deserialize, Serialize};

/// Endpoint specification of a generated backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiSpec {
    /// Authentication flow, if any
    #[serde(default)]
    pub auth: AuthSpec,

    /// Declared entities, in declaration order
    #[serde(default)]
    pub entities: Vec<EntitySpec>,
}

/// Authentication settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSpec {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_register_path")]
    pub register_path: String,

    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// Entity backing the auth flow; not smoke-tested as a plain entity
    #[serde(default = "default_subject")]
    pub subject: String,
}

fn default_register_path() -> String {
    "/auth/register".to_string()
}

fn default_login_path() -> String {
    "/auth/login".to_string()
}

fn default_subject() -> String {
    "User".to_string()
}

impl Default for AuthSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            register_path: default_register_path(),
            login_path: default_login_path(),
            subject: default_subject(),
        }
    }
}

/// A declared entity with a CRUD collection endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySpec {
    pub name: String,

    /// Collection path; derived from the name when absent
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

/// A field of an entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,

    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,

    #[serde(default)]
    pub primary_key: bool,
}

fn default_field_type() -> String {
    "string".to_string()
}

impl FieldSpec {
    /// Identifiers are assigned by the service, never sent on create
    pub fn is_identifier(&self) -> bool {
        self.primary_key || self.name.eq_ignore_ascii_case("id")
    }
}

impl EntitySpec {
    /// Collection endpoint, e.g. `BlogPost` -> `/blog_posts`
    pub fn collection_path(&self) -> String {
        match &self.path {
            Some(path) if !path.is_empty() => {
                let path = path.trim_end_matches('/');
                if path.starts_with('/') {
                    path.to_string()
                } else {
                    format!("/{}", path)
                }
            }
            _ => format!("/{}s", to_snake_case(&self.name)),
        }
    }
}

impl ApiSpec {
    /// Whether the entity is the auth subject and therefore skipped
    pub fn is_auth_subject(&self, entity: &EntitySpec) -> bool {
        self.auth.enabled && entity.name.eq_ignore_ascii_case(&self.auth.subject)
    }

    /// Entities that receive create/list smoke checks
    pub fn tested_entities(&self) -> impl Iterator<Item = &EntitySpec> {
        self.entities.iter().filter(|e| !self.is_auth_subject(e))
    }
}

/// `BlogPost` -> `blog_post`, `HTTPLog` -> `http_log`
fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1);
            let word_start = prev.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit())
                || (prev.is_some_and(|p| p.is_ascii_uppercase()) && next.is_some_and(|n| n.is_ascii_lowercase()));
            if word_start && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c == ' ' || c == '-' {
            out.push('_');
        } else {
            out.push(c);
        }
    }
    out
}
