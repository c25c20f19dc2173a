use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AttackSurface {
    #[serde(rename = "EntraID")]
    EntraId,
    Azure,
    #[serde(rename = "AWS")]
    Aws,
    M365,
}

impl AttackSurface {
    pub fn all() -> [AttackSurface; 4] {
        [
            AttackSurface::EntraId,
            AttackSurface::Azure,
            AttackSurface::Aws,
            AttackSurface::M365,
        ]
    }
}

impl std::fmt::Display for AttackSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttackSurface::EntraId => write!(f, "EntraID"),
            AttackSurface::Azure => write!(f, "Azure"),
            AttackSurface::Aws => write!(f, "AWS"),
            AttackSurface::M365 => write!(f, "M365"),
        }
    }
}

impl std::str::FromStr for AttackSurface {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "entraid" | "entra" | "entra_id" => Ok(AttackSurface::EntraId),
            "azure" | "az" => Ok(AttackSurface::Azure),
            "aws" => Ok(AttackSurface::Aws),
            "m365" => Ok(AttackSurface::M365),
            _ => Err(format!(
                "Unknown attack surface '{}'. Valid surfaces: EntraID, Azure, AWS, M365",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    Text,
    Password,
    Number,
    File,
}

impl std::fmt::Display for InputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputKind::Text => write!(f, "text"),
            InputKind::Password => write!(f, "password"),
            InputKind::Number => write!(f, "number"),
            InputKind::File => write!(f, "file"),
        }
    }
}

/// One positional parameter of a technique invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputField {
    pub title: String,
    pub key: String,
    #[serde(default)]
    pub kind: InputKind,
    #[serde(default)]
    pub placeholder: String,
}

impl InputField {
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            key: key.into(),
            kind: InputKind::Text,
            placeholder: String::new(),
        }
    }

    pub fn with_kind(mut self, kind: InputKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }
}

/// Catalog entry for one technique. Loaded once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechniqueDescriptor {
    /// Filled from the catalog map key when absent from the entry itself.
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub attack_surface: AttackSurface,
    pub execution_path: String,
    #[serde(default)]
    pub input_spec: Vec<InputField>,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl TechniqueDescriptor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        attack_surface: AttackSurface,
        execution_path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            attack_surface,
            execution_path: execution_path.into(),
            input_spec: Vec::new(),
            references: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn with_input(mut self, field: InputField) -> Self {
        self.input_spec.push(field);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.references.push(reference.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

/// What a technique hands back to the engine.
///
/// `Opaque` covers techniques that return a bare value without a success flag.
#[derive(Debug, Clone, PartialEq)]
pub enum TechniqueResult {
    Structured {
        success: bool,
        raw: Value,
        pretty: Option<Value>,
    },
    Opaque(Value),
}

impl TechniqueResult {
    pub fn success(raw: Value, pretty: Option<Value>) -> Self {
        TechniqueResult::Structured {
            success: true,
            raw,
            pretty,
        }
    }

    pub fn failure(raw: Value) -> Self {
        TechniqueResult::Structured {
            success: false,
            raw,
            pretty: None,
        }
    }

    /// Collapses the result into the recorded response and its success flag.
    ///
    /// `pretty` wins over `raw` unless it is absent or JSON null.
    pub fn normalize(self) -> (Value, bool) {
        match self {
            TechniqueResult::Structured {
                success,
                raw,
                pretty,
            } => match pretty {
                Some(pretty) if !pretty.is_null() => (pretty, success),
                _ => (raw, success),
            },
            TechniqueResult::Opaque(value) => (value, true),
        }
    }
}

/// Human readable form of a recorded response. Strings are written without quotes.
pub fn render_response(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}
