//! Skill system — discovers and loads SKILL.md files.
//!
//! Skills are user-defined capabilities stored as Markdown files with YAML
//! frontmatter (`name`, `description`, `auto-activate`, `requires: {bins,
//! env}`) and a Markdown instructions body. A skill whose `requires` isn't
//! satisfied — a binary missing from `PATH`, an unset env var — is still
//! loaded, just left `enabled: false`.

use crate::types::{is_valid_skill_name, Skill, SkillRequirement, SkillSource};
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;
use tracing::{debug, info, warn};

/// Load all skills from the skills directory.
pub fn load_skills(skills_dir: &str) -> Result<Vec<Skill>> {
    let dir = Path::new(skills_dir);

    if !dir.exists() {
        debug!("Skills directory does not exist: {:?}", dir);
        return Ok(Vec::new());
    }

    let mut skills = Vec::new();

    let entries = std::fs::read_dir(dir).context("Failed to read skills directory")?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();

        let skill_file = if path.is_file() && path.file_name().map(|n| n == "SKILL.md").unwrap_or(false) {
            Some(path.clone())
        } else if path.is_dir() {
            let candidate = path.join("SKILL.md");
            candidate.exists().then_some(candidate)
        } else {
            None
        };

        let Some(skill_file) = skill_file else { continue };

        match parse_skill_file(&skill_file) {
            Ok(skill) => {
                if !is_valid_skill_name(&skill.name) {
                    warn!("Skipping skill at {:?}: invalid name '{}'", skill_file, skill.name);
                    continue;
                }
                info!(
                    "Loaded skill: {} (enabled={}, auto_activate={})",
                    skill.name, skill.enabled, skill.auto_activate
                );
                skills.push(skill);
            }
            Err(e) => {
                warn!("Failed to parse skill at {:?}: {}", skill_file, e);
            }
        }
    }

    info!("Loaded {} skills from {:?}", skills.len(), dir);
    Ok(skills)
}

/// YAML frontmatter structure for a SKILL.md file.
#[derive(Debug, serde::Deserialize)]
struct SkillFrontmatter {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "auto-activate")]
    auto_activate: Option<bool>,
    #[serde(default)]
    requires: Option<RequiresYaml>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct RequiresYaml {
    #[serde(default)]
    bins: Vec<String>,
    #[serde(default)]
    env: Vec<String>,
}

/// Parse a SKILL.md file with YAML frontmatter.
///
/// Format:
/// ```markdown
/// ---
/// name: my-skill
/// description: Does something
/// auto-activate: true
/// requires:
///   bins: [curl]
///   env: [WEATHER_API_KEY]
/// ---
/// Instructions here...
/// ```
fn parse_skill_file(path: &Path) -> Result<Skill> {
    let content = std::fs::read_to_string(path).context("Failed to read skill file")?;

    let (frontmatter_str, instructions) = split_frontmatter(&content);

    let fm: SkillFrontmatter = if frontmatter_str.is_empty() {
        SkillFrontmatter {
            name: None,
            description: None,
            auto_activate: None,
            requires: None,
        }
    } else {
        serde_yaml::from_str(frontmatter_str).context("Failed to parse SKILL.md frontmatter")?
    };

    let default_name = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();

    let requires = fm.requires.unwrap_or_default();
    let mut requirements = Vec::new();
    requirements.extend(requires.bins.iter().cloned().map(|value| SkillRequirement {
        kind: "binary".to_string(),
        value,
    }));
    requirements.extend(requires.env.iter().cloned().map(|value| SkillRequirement {
        kind: "env".to_string(),
        value,
    }));

    let enabled = requires.bins.iter().all(|b| binary_on_path(b))
        && requires.env.iter().all(|e| std::env::var(e).is_ok());

    let installed_at = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(chrono::DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    Ok(Skill {
        name: fm.name.unwrap_or(default_name),
        description: fm.description.unwrap_or_default(),
        version: "1.0.0".to_string(),
        auto_activate: fm.auto_activate.unwrap_or(false),
        enabled,
        instructions,
        requirements,
        source: SkillSource::Disk,
        installed_at,
    })
}

/// Whether a named binary is found in any directory on `PATH`.
fn binary_on_path(name: &str) -> bool {
    let Some(path_var) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path_var).any(|dir| dir.join(name).is_file())
}

/// Split YAML frontmatter (between `---` markers) from the rest of the content.
fn split_frontmatter(content: &str) -> (&str, String) {
    let trimmed = content.trim_start();

    if !trimmed.starts_with("---") {
        return ("", content.to_string());
    }

    // Find the closing ---
    let after_first = &trimmed[3..];
    if let Some(end_idx) = after_first.find("\n---") {
        let fm = &after_first[..end_idx].trim();
        let body = &after_first[end_idx + 4..];
        (fm, body.trim_start_matches('\n').to_string())
    } else {
        ("", content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn skill_without_requirements_is_enabled() {
        let dir = tempdir();
        let path = dir.join("SKILL.md");
        std::fs::write(
            &path,
            "---\nname: greeter\ndescription: says hi\nauto-activate: true\n---\nSay hello.",
        )
        .unwrap();
        let skill = parse_skill_file(&path).unwrap();
        assert_eq!(skill.name, "greeter");
        assert!(skill.enabled);
        assert!(skill.auto_activate);
        assert_eq!(skill.instructions.trim(), "Say hello.");
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn skill_with_unmet_binary_requirement_is_disabled() {
        let dir = tempdir();
        let path = dir.join("SKILL.md");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "---\nname: deployer\nrequires:\n  bins: [definitely-not-a-real-binary-xyz]\n---\nDeploy things."
        )
        .unwrap();
        let skill = parse_skill_file(&path).unwrap();
        assert!(!skill.enabled);
        std::fs::remove_dir_all(dir).ok();
    }

    fn tempdir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("skill-test-{}", ulid::Ulid::new()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
