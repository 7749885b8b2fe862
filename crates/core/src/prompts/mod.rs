use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const BUILT_IN_PROMPTS: &str = include_str!("../../prompts/default.toml");

pub type PromptArguments = HashMap<String, String>;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt `{0}` not found")]
    NotFound(String),
    #[error("missing argument `{argument}` when rendering prompt `{key}`")]
    MissingArgument { key: String, argument: String },
    #[error("failed to read prompt file `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse built-in prompt definitions: {0}")]
    ParseBuiltIn(toml::de::Error),
    #[error("failed to parse prompt file `{path}`: {source}")]
    ParseFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Clone, Debug)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// One named template. Placeholders use `{name}` syntax; `{{` and `}}` escape
/// literal braces. Every placeholder is a required argument.
#[derive(Clone, Debug)]
pub struct PromptTemplate {
    key: String,
    template: String,
    segments: Vec<Segment>,
    placeholders: BTreeSet<String>,
}

impl PromptTemplate {
    fn parse(key: String, template: String) -> Self {
        let (segments, placeholders) = parse_template(&template);
        Self {
            key,
            template,
            segments,
            placeholders,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.placeholders.iter().map(|s| s.as_str())
    }

    pub fn render(&self, arguments: &PromptArguments) -> Result<String, PromptError> {
        for placeholder in &self.placeholders {
            if !arguments.contains_key(placeholder) {
                return Err(PromptError::MissingArgument {
                    key: self.key.clone(),
                    argument: placeholder.clone(),
                });
            }
        }

        let mut output = String::with_capacity(self.template.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => output.push_str(text),
                Segment::Placeholder(name) => {
                    if let Some(value) = arguments.get(name) {
                        output.push_str(value);
                    }
                }
            }
        }
        Ok(output)
    }
}

/// Built-in prompt templates plus optional user overrides loaded from TOML
/// files in custom directories. Later directories win; files within a
/// directory are applied in name order.
#[derive(Debug)]
pub struct PromptRegistry {
    prompts: BTreeMap<String, PromptTemplate>,
    directories: Vec<PathBuf>,
}

impl PromptRegistry {
    pub fn new() -> Result<Self, PromptError> {
        Self::with_custom_directories(Vec::new())
    }

    pub fn with_custom_directories(directories: Vec<PathBuf>) -> Result<Self, PromptError> {
        let mut registry = Self {
            prompts: BTreeMap::new(),
            directories,
        };
        registry.reload()?;
        Ok(registry)
    }

    pub fn custom_directories(&self) -> &[PathBuf] {
        &self.directories
    }

    pub fn reload(&mut self) -> Result<(), PromptError> {
        let mut prompts = BTreeMap::new();

        let document: PromptDocument =
            toml::from_str(BUILT_IN_PROMPTS).map_err(PromptError::ParseBuiltIn)?;
        insert_document(&mut prompts, document);

        for dir in &self.directories {
            load_directory(dir, &mut prompts)?;
        }

        self.prompts = prompts;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&PromptTemplate> {
        self.prompts.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.prompts.keys().map(|k| k.as_str())
    }

    pub fn format_with<I, K, V>(&self, key: &str, arguments: I) -> Result<String, PromptError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let template = self
            .get(key)
            .ok_or_else(|| PromptError::NotFound(key.to_string()))?;
        let mut map = PromptArguments::new();
        for (key, value) in arguments {
            map.insert(key.into(), value.into());
        }
        template.render(&map)
    }
}

#[derive(Debug, Deserialize)]
struct PromptDocument {
    #[serde(default)]
    prompts: BTreeMap<String, RawPrompt>,
}

#[derive(Debug, Deserialize)]
struct RawPrompt {
    #[serde(alias = "text")]
    template: String,
}

fn insert_document(prompts: &mut BTreeMap<String, PromptTemplate>, document: PromptDocument) {
    for (key, raw) in document.prompts {
        prompts.insert(key.clone(), PromptTemplate::parse(key, raw.template));
    }
}

fn load_directory(
    dir: &Path,
    prompts: &mut BTreeMap<String, PromptTemplate>,
) -> Result<(), PromptError> {
    if !dir.is_dir() {
        return Ok(());
    }

    let mut files = Vec::new();
    let entries = fs::read_dir(dir).map_err(|source| PromptError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| PromptError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("toml") {
            files.push(path);
        }
    }
    files.sort();

    for path in files {
        let contents = fs::read_to_string(&path).map_err(|source| PromptError::Io {
            path: path.clone(),
            source,
        })?;
        let document: PromptDocument =
            toml::from_str(&contents).map_err(|source| PromptError::ParseFile {
                path: path.clone(),
                source,
            })?;
        insert_document(prompts, document);
    }

    Ok(())
}

fn parse_template(template: &str) -> (Vec<Segment>, BTreeSet<String>) {
    let mut segments = Vec::new();
    let mut placeholders = BTreeSet::new();
    let mut buffer = String::new();
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' => {
                if matches!(chars.peek(), Some('{')) {
                    chars.next();
                    buffer.push('{');
                    continue;
                }

                let mut name = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == '}' {
                        closed = true;
                        break;
                    }
                    name.push(next);
                }

                if closed && !name.trim().is_empty() {
                    if !buffer.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut buffer)));
                    }
                    let key = name.trim().to_string();
                    placeholders.insert(key.clone());
                    segments.push(Segment::Placeholder(key));
                } else {
                    buffer.push('{');
                    buffer.push_str(&name);
                    if closed {
                        buffer.push('}');
                    }
                }
            }
            '}' => {
                if matches!(chars.peek(), Some('}')) {
                    chars.next();
                }
                buffer.push('}');
            }
            _ => buffer.push(ch),
        }
    }

    if !buffer.is_empty() {
        segments.push(Segment::Literal(buffer));
    }

    (segments, placeholders)
}
