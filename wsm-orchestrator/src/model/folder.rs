use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub display_name: String,
    pub description: Option<String>,
    pub parent_folder_id: Option<Uuid>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Check that a workspace's folders form a forest: every parent resolves to
/// a folder of the same workspace and no folder is its own ancestor.
pub fn validate_folder_forest(workspace_id: Uuid, folders: &[Folder]) -> Result<()> {
    let parents: HashMap<Uuid, Option<Uuid>> = folders
        .iter()
        .map(|folder| (folder.id, folder.parent_folder_id))
        .collect();

    for folder in folders {
        if folder.workspace_id != workspace_id {
            return Err(OrchestratorError::InvalidState(format!(
                "folder {} belongs to workspace {}, expected {}",
                folder.id, folder.workspace_id, workspace_id
            )));
        }
        if let Some(parent) = folder.parent_folder_id {
            if !parents.contains_key(&parent) {
                return Err(OrchestratorError::InvalidState(format!(
                    "folder {} has parent {} outside workspace {}",
                    folder.id, parent, workspace_id
                )));
            }
        }
    }

    for folder in folders {
        let mut seen = HashSet::new();
        let mut cursor = Some(folder.id);
        while let Some(id) = cursor {
            if !seen.insert(id) {
                return Err(OrchestratorError::InvalidState(format!(
                    "folder {} is part of a parent cycle",
                    folder.id
                )));
            }
            cursor = parents.get(&id).copied().flatten();
        }
    }

    Ok(())
}
