//! Workspace selection and dependency graph

pub mod cycles;
pub mod graph;

pub use cycles::{resolve_cycles, CycleEdge, CycleResolution};
pub use graph::{WorkspaceGraph, WorkspaceNode};

use crate::config::{Config, WorkspaceConfig};
use crate::error::WorkspaceError;

/// Select workspaces by exact name, keeping configuration order.
///
/// An empty `names` selects every workspace.
pub fn select_workspaces<'a>(
    config: &'a Config,
    names: &[String],
) -> Result<Vec<&'a WorkspaceConfig>, WorkspaceError> {
    if let Some(unknown) = names.iter().find(|n| config.workspace(n).is_none()) {
        return Err(WorkspaceError::NotFound(unknown.clone()));
    }
    Ok(config
        .workspaces
        .iter()
        .filter(|w| names.is_empty() || names.contains(&w.name))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            workspaces: vec![
                WorkspaceConfig::new("a", "a"),
                WorkspaceConfig::new("b", "b"),
                WorkspaceConfig::new("c", "c"),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_select_all() {
        let config = config();
        let selected = select_workspaces(&config, &[]).unwrap();
        assert_eq!(selected.len(), 3);
    }

    #[test]
    fn test_select_keeps_config_order() {
        let config = config();
        let selected = select_workspaces(&config, &["c".to_string(), "a".to_string()]).unwrap();
        let names: Vec<&str> = selected.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn test_select_unknown() {
        let config = config();
        let err = select_workspaces(&config, &["zzz".to_string()]).unwrap_err();
        assert!(matches!(err, WorkspaceError::NotFound(name) if name == "zzz"));
    }
}
