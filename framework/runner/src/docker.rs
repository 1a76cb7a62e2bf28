use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

use crate::types::BenchResult;

/// Environment variable to override the `docker` binary used to reach the infrastructure
/// containers.
pub const QB_DOCKER_PATH_ENV: &str = "QB_DOCKER_PATH";

/// Get the path to the `docker` binary.
///
/// [`QB_DOCKER_PATH_ENV`] may hold either a path to the binary or the name of a compatible binary
/// to look up in the user's `PATH`, such as `podman`. Without it, `docker` is looked up in `PATH`.
pub fn docker_path() -> BenchResult<PathBuf> {
    resolve_docker_path(env::var(QB_DOCKER_PATH_ENV).ok().as_deref())
}

fn resolve_docker_path(configured: Option<&str>) -> BenchResult<PathBuf> {
    let name = match configured {
        Some("") => bail!("'{QB_DOCKER_PATH_ENV}' set to empty string"),
        Some(value) if Path::new(value).components().count() > 1 => {
            let path = PathBuf::from(value);
            if !path.exists() {
                bail!(
                    "Docker binary overridden with '{QB_DOCKER_PATH_ENV}={}' but that path doesn't exist",
                    path.display()
                );
            }
            return Ok(path);
        }
        Some(name) => name,
        None => "docker",
    };

    log::debug!("Looking for '{name}' in the user's 'PATH'");
    which::which(name).with_context(|| {
        format!(
            "'{name}' not found in PATH. Please install Docker or set '{QB_DOCKER_PATH_ENV}' to the correct path."
        )
    })
}

#[cfg(test)]
mod tests {
    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn missing_override_path_is_an_error() {
        assert!(resolve_docker_path(Some("/non/existent/path/to/docker")).is_err());
    }

    #[test]
    fn empty_override_is_an_error() {
        assert!(resolve_docker_path(Some("")).is_err());
    }

    #[test]
    fn override_path_is_used_as_is() {
        let temp = NamedTempFile::new().unwrap();

        let resolved = resolve_docker_path(temp.path().to_str()).unwrap();

        assert_eq!(temp.path(), resolved);
    }

    #[cfg(unix)]
    #[test]
    fn override_name_is_looked_up_in_path() {
        let resolved = resolve_docker_path(Some("sh")).unwrap();

        assert!(resolved.is_absolute());
    }

    #[test]
    fn unknown_name_is_an_error() {
        assert!(resolve_docker_path(Some("queue-bench-no-such-docker")).is_err());
    }
}
