//! Pure regeneration-set diff algorithm (§4.2 step 3), kept free of any
//! state-store or queue dependency so it is trivially unit-testable.

use vf_models::{RenderJob, Segment, SegmentId};

/// Segments (in timeline order) that must be (re)generated for a new render.
///
/// With no prior completed render, every non-COMPLETED segment regenerates.
/// Otherwise a segment regenerates if its id is new since the last render, or
/// it isn't COMPLETED, or it has no live asset — i.e. it failed the
/// "unchanged since last render" test.
pub fn regeneration_set(current_segments: &[Segment], last_completed_render: Option<&RenderJob>) -> Vec<SegmentId> {
    match last_completed_render {
        None => current_segments
            .iter()
            .filter(|s| !s.is_live())
            .map(|s| s.id)
            .collect(),
        Some(last) => {
            let prior_ids: std::collections::HashSet<SegmentId> = last.segment_ids.iter().copied().collect();
            current_segments
                .iter()
                .filter(|s| !prior_ids.contains(&s.id) || !s.is_live())
                .map(|s| s.id)
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vf_models::{ProjectId, SegmentStatus};

    fn completed_segment(project_id: ProjectId) -> Segment {
        let mut s = Segment::new(project_id, 0, "p", json!({}));
        s.status = SegmentStatus::Completed;
        s.asset_url = Some("segments/p/s.mp4".to_string());
        s
    }

    #[test]
    fn first_render_includes_every_non_completed_segment() {
        let project_id = ProjectId::new();
        let pending = Segment::new(project_id, 0, "a", json!({}));
        let done = completed_segment(project_id);

        let set = regeneration_set(&[pending.clone(), done.clone()], None);

        assert_eq!(set, vec![pending.id]);
    }

    #[test]
    fn unchanged_completed_segments_are_excluded_on_incremental_render() {
        let project_id = ProjectId::new();
        let unchanged = completed_segment(project_id);
        let mut job = RenderJob::new(project_id, vec![unchanged.id], 0);
        job.segments_total = 0;

        let set = regeneration_set(&[unchanged], Some(&job));

        assert!(set.is_empty());
    }

    #[test]
    fn segment_reset_to_pending_by_an_edit_is_included_again() {
        let project_id = ProjectId::new();
        let mut edited = completed_segment(project_id);
        let segment_id = edited.id;
        let job = RenderJob::new(project_id, vec![segment_id], 0);

        edited.apply_edit(Some("new prompt".to_string()), None);

        let set = regeneration_set(&[edited], Some(&job));

        assert_eq!(set, vec![segment_id]);
    }

    #[test]
    fn a_brand_new_segment_not_in_the_prior_render_is_included() {
        let project_id = ProjectId::new();
        let unchanged = completed_segment(project_id);
        let new_segment = Segment::new(project_id, 1, "new", json!({}));
        let job = RenderJob::new(project_id, vec![unchanged.id], 0);

        let set = regeneration_set(&[unchanged, new_segment.clone()], Some(&job));

        assert_eq!(set, vec![new_segment.id]);
    }

    #[test]
    fn empty_project_yields_empty_set_either_way() {
        assert!(regeneration_set(&[], None).is_empty());
    }
}
