use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

fn default_chapter_count() -> u32 {
    8
}

fn default_code_language() -> String {
    "Python".to_string()
}

fn default_target_length() -> String {
    "Medium".to_string()
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum TargetAudience {
    Novice,
    #[default]
    Intermediate,
    Expert,
}

impl TargetAudience {
    /// Reader profile as it appears in generation prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Novice => "novice readers with little or no prior experience",
            Self::Intermediate => "working engineers with some development experience",
            Self::Expert => "senior experts looking for depth and internals",
        }
    }
}

impl fmt::Display for TargetAudience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum WritingStyle {
    #[default]
    TechnicalManual,
    Tutorial,
    PracticalGuide,
    ReferenceManual,
}

impl WritingStyle {
    pub fn label(&self) -> &'static str {
        match self {
            Self::TechnicalManual => "Technical Manual",
            Self::Tutorial => "Tutorial",
            Self::PracticalGuide => "Practical Guide",
            Self::ReferenceManual => "Reference Manual",
        }
    }

    /// Tone hint passed alongside the style name in prompts.
    pub fn tone(&self) -> &'static str {
        match self {
            Self::TechnicalManual => "rigorous, authoritative, focused on specifications",
            Self::Tutorial => "step by step, building from the basics, easy to follow",
            Self::PracticalGuide => "hands-on, clear procedures, solving concrete problems",
            Self::ReferenceManual => "terse, lookup-friendly, clearly itemized",
        }
    }
}

impl fmt::Display for WritingStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum OutputLanguage {
    #[default]
    English,
    Chinese,
}

impl OutputLanguage {
    /// Instruction sentence injected into every generation prompt.
    pub fn instruction(&self) -> &'static str {
        match self {
            Self::English => "The output MUST be written in English.",
            Self::Chinese => "The output MUST be written in Simplified Chinese.",
        }
    }
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("project description must not be empty")]
    EmptyDescription,
    #[error("chapter count must be at least 1")]
    NoChapters,
    #[error("failed to read material file `{path}`: {source}")]
    ReadMaterial {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// User-supplied book configuration. Mutable until outline generation starts;
/// nothing enforces the freeze, matching the original design.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Project {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub materials: String,
    #[serde(default = "default_code_language")]
    pub code_language: String,
    #[serde(default)]
    pub output_language: OutputLanguage,
    #[serde(default)]
    pub writing_style: WritingStyle,
    #[serde(default)]
    pub target_audience: TargetAudience,
    #[serde(default)]
    pub reference_links: Vec<String>,
    #[serde(default = "default_target_length")]
    pub target_length: String,
    #[serde(default = "default_chapter_count")]
    pub chapter_count: u32,
}

impl Default for Project {
    fn default() -> Self {
        Self {
            description: String::new(),
            materials: String::new(),
            code_language: default_code_language(),
            output_language: OutputLanguage::default(),
            writing_style: WritingStyle::default(),
            target_audience: TargetAudience::default(),
            reference_links: Vec::new(),
            target_length: default_target_length(),
            chapter_count: default_chapter_count(),
        }
    }
}

impl Project {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    /// Pre-flight validation used before outline generation may be triggered.
    pub fn validate(&self) -> Result<(), ProjectError> {
        if self.description.trim().is_empty() {
            return Err(ProjectError::EmptyDescription);
        }
        if self.chapter_count == 0 {
            return Err(ProjectError::NoChapters);
        }
        Ok(())
    }

    /// Appends reference text to the materials field with a provenance header
    /// so the source file stays identifiable inside the prompt.
    pub fn append_material(&mut self, name: &str, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        if !self.materials.is_empty() {
            self.materials.push_str("\n\n");
        }
        self.materials
            .push_str(&format!("--- source: {name} ---\n{}", text.trim_end()));
    }

    /// Reads an arbitrary user file as text, best effort: bytes are decoded
    /// lossily, binary formats are not parsed.
    pub fn append_material_file(&mut self, path: &Path) -> Result<(), ProjectError> {
        let bytes = fs::read(path).map_err(|source| ProjectError::ReadMaterial {
            path: path.to_path_buf(),
            source,
        })?;
        let text = String::from_utf8_lossy(&bytes);
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        self.append_material(&name, &text);
        Ok(())
    }

    pub fn add_reference_link(&mut self, url: impl Into<String>) {
        let url = url.into();
        if !url.trim().is_empty() {
            self.reference_links.push(url.trim().to_string());
        }
    }

    pub fn remove_reference_link(&mut self, index: usize) -> Option<String> {
        if index < self.reference_links.len() {
            Some(self.reference_links.remove(index))
        } else {
            None
        }
    }

    pub fn reference_links_joined(&self) -> String {
        self.reference_links.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn empty_description_fails_validation() {
        let project = Project::new("   ");
        assert!(matches!(
            project.validate(),
            Err(ProjectError::EmptyDescription)
        ));
    }

    #[test]
    fn default_project_has_original_defaults() {
        let project = Project::default();
        assert_eq!(project.chapter_count, 8);
        assert_eq!(project.code_language, "Python");
        assert_eq!(project.target_audience, TargetAudience::Intermediate);
    }

    #[test]
    fn materials_carry_provenance_headers() {
        let mut project = Project::new("embedded primer");
        project.append_material("gpio.md", "GPIO basics\n");
        project.append_material("uart.md", "UART notes");
        assert!(project.materials.contains("--- source: gpio.md ---"));
        assert!(project.materials.contains("--- source: uart.md ---"));
        assert!(project.materials.contains("GPIO basics"));
    }

    #[test]
    fn material_file_is_decoded_lossily() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.bin");
        fs::write(&path, [0x68, 0x69, 0xFF, 0x21]).unwrap();

        let mut project = Project::new("test");
        project.append_material_file(&path).unwrap();
        assert!(project.materials.contains("--- source: notes.bin ---"));
        assert!(project.materials.contains("hi"));
    }

    #[test]
    fn blank_links_are_ignored() {
        let mut project = Project::default();
        project.add_reference_link("  ");
        project.add_reference_link("https://example.com/doc");
        assert_eq!(project.reference_links.len(), 1);
        assert_eq!(project.remove_reference_link(5), None);
    }
}
