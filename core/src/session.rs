use crate::config::UiConfig;
use crate::figure::frame_subkey;
use crate::filter::{FilterSpec, Visibility, VisibilityMask};
use crate::frames::FrameSequence;
use crate::prelude::{CoreError, CoreResult};
use crate::store::{CacheKey, SessionCache};
use crate::table::DetectionTable;

/// Summary returned by a completed file-load bootstrap.
#[derive(Debug, Clone)]
pub struct SessionInit {
    pub frame_count: usize,
    pub row_count: usize,
    pub filter: FilterSpec,
}

/// File-load bootstrap: (re)creates every per-session artifact the rest of
/// the pipeline reads. The per-frame slices written here are the single
/// canonical frame-row source for both the background buffer pass and
/// on-demand assembly.
pub fn initialize_session(
    cache: &SessionCache,
    session: &str,
    config: &UiConfig,
    table: &DetectionTable,
) -> CoreResult<SessionInit> {
    let frames = FrameSequence::from_table(table, &config.slider)?;

    cache.set_json(session, CacheKey::Config, None, config)?;
    cache.set_json(session, CacheKey::Dataset, None, table)?;
    cache.set_json(session, CacheKey::FrameList, None, &frames)?;
    for &frame_key in frames.keys() {
        let slice = table.frame_slice(&config.slider, frame_key)?;
        cache.set_json(
            session,
            CacheKey::FrameData,
            Some(&frame_subkey(frame_key)),
            &slice,
        )?;
    }

    cache.set_json(session, CacheKey::VisibleTable, None, &VisibilityMask::new())?;

    let filter = FilterSpec::defaults(config, table);
    cache.set_json(session, CacheKey::FilterState, None, &filter)?;

    cache.set_json(session, CacheKey::TaskId, None, &0u64)?;
    cache.set_ready_index(session, -1)?;

    log::info!(
        "session {}: loaded {} rows across {} frames",
        session,
        table.len(),
        frames.len()
    );

    Ok(SessionInit {
        frame_count: frames.len(),
        row_count: table.len(),
        filter,
    })
}

/// Supersedes any in-flight buffer run: bumps the task id and resets the
/// ready index so no stale artifact can be served as current.
pub fn invalidate_buffer(cache: &SessionCache, session: &str) -> CoreResult<u64> {
    let task_id = cache.bump_task_id(session)?;
    cache.set_ready_index(session, -1)?;
    Ok(task_id)
}

/// Stores the user-adjusted filter parameters (last write wins).
pub fn update_filter(cache: &SessionCache, session: &str, spec: &FilterSpec) -> CoreResult<()> {
    spec.validate()?;
    cache.set_json(session, CacheKey::FilterState, None, spec)
}

fn load_mask(cache: &SessionCache, session: &str) -> CoreResult<VisibilityMask> {
    cache
        .get_json::<VisibilityMask>(session, CacheKey::VisibleTable, None)?
        .ok_or(CoreError::MissingState("visibility mask"))
}

/// Click-to-toggle on one point; returns the row's new state.
pub fn toggle_visibility(
    cache: &SessionCache,
    session: &str,
    row_id: u64,
) -> CoreResult<Visibility> {
    let mut mask = load_mask(cache, session)?;
    let state = mask.toggle(row_id);
    cache.set_json(session, CacheKey::VisibleTable, None, &mask)?;
    Ok(state)
}

/// Box/lasso selection hide or unhide.
pub fn set_selection_visibility(
    cache: &SessionCache,
    session: &str,
    row_ids: &[u64],
    state: Visibility,
) -> CoreResult<()> {
    let mut mask = load_mask(cache, session)?;
    mask.set_many(row_ids, state);
    cache.set_json(session, CacheKey::VisibleTable, None, &mask)
}
