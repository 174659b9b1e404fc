/// Centralized platform-specific path computation
///
/// Follows the XDG Base Directory specification on Unix-like systems.
/// Working copies of cloned repositories go to `$TEMP_FOLDER` when it is
/// set, otherwise to the system temp directory.
use sha2::{Digest, Sha256};
use std::path::PathBuf;

const PROJECT_DIR: &str = "commit-indexer";

/// Platform-agnostic path utilities
pub struct PlatformPaths;

impl PlatformPaths {
    /// Get the appropriate data directory for the current platform
    ///
    /// - Windows: %LOCALAPPDATA%
    /// - macOS: ~/Library/Application Support
    /// - Linux/Unix: $XDG_DATA_HOME or ~/.local/share
    pub fn data_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            std::env::var("LOCALAPPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join("Library/Application Support"))
                .unwrap_or_else(|_| PathBuf::from("."))
        } else {
            std::env::var("XDG_DATA_HOME")
                .map(PathBuf::from)
                .or_else(|_| {
                    std::env::var("HOME").map(|home| PathBuf::from(home).join(".local/share"))
                })
                .unwrap_or_else(|_| PathBuf::from("."))
        }
    }

    /// Get the appropriate config directory for the current platform
    ///
    /// - Windows: %APPDATA%
    /// - macOS: ~/Library/Application Support
    /// - Linux/Unix: $XDG_CONFIG_HOME or ~/.config
    pub fn config_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join("Library/Application Support"))
                .unwrap_or_else(|_| PathBuf::from("."))
        } else {
            std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|home| PathBuf::from(home).join(".config")))
                .unwrap_or_else(|_| PathBuf::from("."))
        }
    }

    /// Scratch directory for clones: $TEMP_FOLDER or the system temp dir
    pub fn temp_dir() -> PathBuf {
        std::env::var("TEMP_FOLDER")
            .ok()
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Returns: {data_dir}/commit-indexer
    pub fn project_data_dir() -> PathBuf {
        Self::data_dir().join(PROJECT_DIR)
    }

    /// Returns: {config_dir}/commit-indexer
    pub fn project_config_dir() -> PathBuf {
        Self::config_dir().join(PROJECT_DIR)
    }

    /// Returns: {temp_dir}/commit-indexer/clones
    pub fn default_clone_dir() -> PathBuf {
        Self::temp_dir().join(PROJECT_DIR).join("clones")
    }

    /// Returns: {data_dir}/commit-indexer/repositories.json
    pub fn default_records_path() -> PathBuf {
        Self::project_data_dir().join("repositories.json")
    }

    /// Returns: {data_dir}/commit-indexer/checkpoints.json
    pub fn default_checkpoint_path() -> PathBuf {
        Self::project_data_dir().join("checkpoints.json")
    }

    /// Returns: {config_dir}/commit-indexer/config.toml
    pub fn default_config_path() -> PathBuf {
        Self::project_config_dir().join("config.toml")
    }
}

/// Folder name for a repository's working copy.
///
/// The last path segment of the URL without `.git`, suffixed with a short
/// SHA-256 of the full URL so `a/docs.git` and `b/docs.git` do not collide.
pub fn checkout_folder_name(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let last = trimmed
        .rsplit(['/', ':', '\\'])
        .next()
        .unwrap_or(trimmed);
    let name = last.strip_suffix(".git").unwrap_or(last);
    let name: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let name = if name.is_empty() || name.chars().all(|c| c == '.') {
        "repository".to_string()
    } else {
        name
    };

    let digest = Sha256::digest(trimmed.as_bytes());
    let short: String = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect();

    format!("{}-{}", name, short)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_dir_not_empty() {
        let dir = PlatformPaths::data_dir();
        assert!(!dir.as_os_str().is_empty());
    }

    #[test]
    fn test_config_dir_not_empty() {
        let dir = PlatformPaths::config_dir();
        assert!(!dir.as_os_str().is_empty());
    }

    #[test]
    fn test_specific_file_paths() {
        let records = PlatformPaths::default_records_path();
        let checkpoints = PlatformPaths::default_checkpoint_path();
        let config = PlatformPaths::default_config_path();
        let clones = PlatformPaths::default_clone_dir();

        for path in [&records, &checkpoints, &config, &clones] {
            assert!(
                path.to_string_lossy().contains(PROJECT_DIR),
                "Path {:?} should contain '{}'",
                path,
                PROJECT_DIR
            );
        }

        assert!(records.ends_with("repositories.json"));
        assert!(checkpoints.ends_with("checkpoints.json"));
        assert!(config.ends_with("config.toml"));
        assert!(clones.ends_with("clones"));
    }

    #[test]
    fn test_checkout_folder_strips_git_suffix() {
        let name = checkout_folder_name("https://github.com/MicrosoftDocs/azure-docs.git");
        assert!(name.starts_with("azure-docs-"), "got {}", name);
        assert_eq!(name.len(), "azure-docs-".len() + 8);
    }

    #[test]
    fn test_checkout_folder_without_suffix() {
        let name = checkout_folder_name("https://example.com/team/project/");
        assert!(name.starts_with("project-"), "got {}", name);
    }

    #[test]
    fn test_checkout_folder_scp_style() {
        let name = checkout_folder_name("git@github.com:owner/tool.git");
        assert!(name.starts_with("tool-"), "got {}", name);
    }

    #[test]
    fn test_checkout_folder_distinguishes_owners() {
        let a = checkout_folder_name("https://github.com/a/docs.git");
        let b = checkout_folder_name("https://github.com/b/docs.git");
        assert_ne!(a, b);
        assert!(a.starts_with("docs-") && b.starts_with("docs-"));
    }

    #[test]
    fn test_checkout_folder_is_stable() {
        let url = "https://github.com/owner/repo.git";
        assert_eq!(checkout_folder_name(url), checkout_folder_name(url));
    }

    #[test]
    fn test_checkout_folder_fallback_name() {
        let name = checkout_folder_name(".git");
        assert!(name.starts_with("repository-"), "got {}", name);
    }
}
