use chrono::Utc;
use handoff_core::{Handoff, HandoffError};

/// Writes the completed record to `archive/{project}/{YYYY-MM-DD}/{UTCCompact}-{to_agent}-{id8}.json`
/// (spec.md §6 archive layout). Failure to archive does not revert the
/// handoff's status; callers log it at a high severity and move on.
pub async fn archive_handoff(archive_root: &str, handoff: &Handoff) -> Result<String, HandoffError> {
    let now = Utc::now();
    let day = now.format("%Y-%m-%d");
    let compact = now.format("%Y%m%dT%H%M%SZ");
    let id8 = &handoff.handoff_id.simple().to_string()[..8];

    let dir = format!("{archive_root}/{}/{day}", handoff.project_name);
    let path = format!("{dir}/{compact}-{}-{id8}.json", handoff.to_agent);

    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| HandoffError::internal(format!("create archive dir {dir}: {e}")))?;

    let body = serde_json::to_vec_pretty(handoff)
        .map_err(|e| HandoffError::internal(format!("serialize handoff for archive: {e}")))?;

    tokio::fs::write(&path, &body)
        .await
        .map_err(|e| HandoffError::internal(format!("write archive file {path}: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).await;
        let _ = tokio::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755)).await;
    }

    Ok(path)
}
