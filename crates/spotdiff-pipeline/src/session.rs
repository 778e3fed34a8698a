//! Headless tuning session.
//!
//! Models the interactive review loop: a reviewer adjusts the profile,
//! recomputes, removes false positives, adds missed spots by hand, and
//! then accepts or rejects the pair. Rendering and input handling live
//! with whatever front end drives the session; this type only owns the
//! state transitions.
//!
//! Automatic boxes are addressed by their 1-based position in the last
//! detection. Manual boxes carry ids starting at [`MANUAL_ID_START`] so
//! the two never collide.

use std::collections::{BTreeMap, BTreeSet};

use crate::normalize::normalize;
use crate::profile::ParameterProfile;
use crate::types::{BoundingBox, ImagePair, PipelineError, Spot, StagedResult};

/// Accepted spots keyed by stage id.
pub type StageResults = BTreeMap<String, Vec<Spot>>;

/// Side length of a hand-placed box in pixels.
pub const MANUAL_BOX_SIZE: u32 = 40;

/// First id handed out to a manual box.
pub const MANUAL_ID_START: u32 = 1000;

/// Where the session is in the review loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Fresh results for the current pair, nothing decided yet.
    #[default]
    Idle,
    /// The profile changed since the last detection.
    ParametersChanged,
    /// Detection re-ran with the current profile.
    Recomputed,
    /// The current pair's final spots were stored.
    Accepted,
    /// The current pair was skipped.
    Rejected,
}

/// A manual box and its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualBox {
    pub id: u32,
    pub bbox: BoundingBox,
}

/// Review state for one image pair at a time.
#[derive(Debug, Clone)]
pub struct TuningSession {
    initial_profile: ParameterProfile,
    profile: ParameterProfile,
    result: StagedResult,
    removed: BTreeSet<u32>,
    manual: Vec<ManualBox>,
    next_manual_id: u32,
    state: SessionState,
}

impl TuningSession {
    /// Start a session and run detection once with `profile`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the profile is invalid.
    pub fn new(pair: ImagePair, profile: ParameterProfile) -> Result<Self, PipelineError> {
        let result = crate::detect_pair(pair, &profile)?;
        Ok(Self {
            initial_profile: profile.clone(),
            profile,
            result,
            removed: BTreeSet::new(),
            manual: Vec::new(),
            next_manual_id: MANUAL_ID_START,
            state: SessionState::Idle,
        })
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// The profile the next [`recompute`](Self::recompute) will use.
    #[must_use]
    pub const fn profile(&self) -> &ParameterProfile {
        &self.profile
    }

    #[must_use]
    pub const fn pair(&self) -> &ImagePair {
        &self.result.pair
    }

    /// The most recent detection, with intermediates.
    #[must_use]
    pub const fn last_result(&self) -> &StagedResult {
        &self.result
    }

    #[must_use]
    pub fn manual_boxes(&self) -> &[ManualBox] {
        &self.manual
    }

    #[must_use]
    pub const fn removed_ids(&self) -> &BTreeSet<u32> {
        &self.removed
    }

    /// Replace the active profile.
    ///
    /// The profile is validated first; on error the session keeps the
    /// previous profile and state.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `profile` is invalid.
    pub fn set_profile(&mut self, profile: ParameterProfile) -> Result<(), PipelineError> {
        profile.validate()?;
        self.profile = profile;
        self.state = SessionState::ParametersChanged;
        Ok(())
    }

    /// Restore the profile the session started with.
    pub fn reset_profile(&mut self) {
        self.profile = self.initial_profile.clone();
        self.state = SessionState::ParametersChanged;
    }

    /// Re-run detection with the current profile.
    ///
    /// Manual boxes survive. Removed ids are cleared because they index
    /// the previous automatic boxes.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the profile is invalid.
    pub fn recompute(&mut self) -> Result<(), PipelineError> {
        let result = crate::detect_pair(self.result.pair.clone(), &self.profile)?;
        tracing::debug!(spots = result.spots.len(), "recomputed detection");
        self.result = result;
        self.removed.clear();
        self.state = SessionState::Recomputed;
        Ok(())
    }

    /// Add a [`MANUAL_BOX_SIZE`] box centered on `(x, y)`, clipped to the
    /// image. Returns the new box id, or `None` if the point lies outside
    /// the image.
    pub fn add_manual_box(&mut self, x: u32, y: u32) -> Option<u32> {
        let dims = self.result.dimensions;
        if x >= dims.width || y >= dims.height {
            return None;
        }
        let id = self.next_manual_id;
        self.next_manual_id += 1;
        let bbox = BoundingBox::centered(x, y, MANUAL_BOX_SIZE, dims);
        tracing::debug!(id, x = bbox.x, y = bbox.y, "added manual box");
        self.manual.push(ManualBox { id, bbox });
        Some(id)
    }

    /// Remove the box under `(x, y)`.
    ///
    /// The first automatic box (not already removed) containing the point
    /// wins; otherwise the first manual box. Returns the removed id.
    pub fn remove_box_at(&mut self, x: u32, y: u32) -> Option<u32> {
        let automatic = self
            .result
            .boxes
            .iter()
            .zip(1u32..)
            .find(|(b, id)| b.contains_point(x, y) && !self.removed.contains(id))
            .map(|(_, id)| id);
        if let Some(id) = automatic {
            self.removed.insert(id);
            tracing::debug!(id, "removed automatic box");
            return Some(id);
        }

        let pos = self.manual.iter().position(|m| m.bbox.contains_point(x, y))?;
        let removed = self.manual.remove(pos);
        tracing::debug!(id = removed.id, "removed manual box");
        Some(removed.id)
    }

    /// Automatic boxes that were not removed, followed by manual boxes.
    #[must_use]
    pub fn final_boxes(&self) -> Vec<BoundingBox> {
        self.result
            .boxes
            .iter()
            .zip(1u32..)
            .filter(|(_, id)| !self.removed.contains(id))
            .map(|(b, _)| *b)
            .chain(self.manual.iter().map(|m| m.bbox))
            .collect()
    }

    /// [`final_boxes`](Self::final_boxes) normalized, with ids renumbered
    /// from 1.
    #[must_use]
    pub fn final_spots(&self) -> Vec<Spot> {
        normalize(&self.final_boxes(), self.result.dimensions)
    }

    /// Store the final spots under `stage`, replacing any earlier entry.
    pub fn accept(&mut self, stage: &str, results: &mut StageResults) -> Vec<Spot> {
        let spots = self.final_spots();
        tracing::info!(stage, spots = spots.len(), "accepted stage");
        results.insert(stage.to_owned(), spots.clone());
        self.state = SessionState::Accepted;
        spots
    }

    /// Skip the current pair without storing anything.
    pub fn reject(&mut self) {
        tracing::info!("rejected stage");
        self.state = SessionState::Rejected;
    }

    /// Move to a new pair, keeping the current profile.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the profile is invalid.
    pub fn load_next(&mut self, pair: ImagePair) -> Result<(), PipelineError> {
        self.result = crate::detect_pair(pair, &self.profile)?;
        self.removed.clear();
        self.manual.clear();
        self.state = SessionState::Idle;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::profile::Sensitivity;
    use crate::types::RgbImage;

    #[allow(clippy::cast_possible_truncation)]
    fn scene() -> RgbImage {
        RgbImage::from_fn(200, 150, |x, y| {
            image::Rgb([(90 + x % 20) as u8, (110 + y % 15) as u8, 70])
        })
    }

    fn paint(img: &mut RgbImage, x0: u32, y0: u32, size: u32, color: [u8; 3]) {
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                img.put_pixel(x, y, image::Rgb(color));
            }
        }
    }

    /// A pair with two clearly separated changes.
    fn pair_with_two_changes() -> ImagePair {
        let original = scene();
        let mut altered = original.clone();
        paint(&mut altered, 20, 20, 24, [250, 20, 20]);
        paint(&mut altered, 120, 60, 24, [20, 20, 250]);
        ImagePair::reconciled(original, altered)
    }

    fn session() -> TuningSession {
        TuningSession::new(pair_with_two_changes(), ParameterProfile::default()).unwrap()
    }

    #[test]
    fn new_session_is_idle_with_detections() {
        let s = session();
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.last_result().boxes.len(), 2);
        assert_eq!(s.final_boxes(), s.last_result().boxes);
    }

    #[test]
    fn invalid_profile_is_rejected_and_state_kept() {
        let mut s = session();
        let bad = ParameterProfile {
            blur_kernel_size: -1,
            ..ParameterProfile::default()
        };
        assert!(matches!(
            s.set_profile(bad),
            Err(PipelineError::InvalidConfig(_))
        ));
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.profile(), &ParameterProfile::default());
    }

    #[test]
    fn set_profile_then_recompute() {
        let mut s = session();
        s.set_profile(ParameterProfile::preset(Sensitivity::High)).unwrap();
        assert_eq!(s.state(), SessionState::ParametersChanged);
        s.recompute().unwrap();
        assert_eq!(s.state(), SessionState::Recomputed);
        assert_eq!(s.profile(), &ParameterProfile::preset(Sensitivity::High));
    }

    #[test]
    fn reset_restores_initial_profile() {
        let mut s = session();
        s.set_profile(ParameterProfile::preset(Sensitivity::Low)).unwrap();
        s.reset_profile();
        assert_eq!(s.profile(), &ParameterProfile::default());
    }

    #[test]
    fn manual_ids_start_at_1000_and_clip() {
        let mut s = session();
        assert_eq!(s.add_manual_box(100, 140), Some(1000));
        assert_eq!(s.add_manual_box(5, 5), Some(1001));
        let boxes = s.manual_boxes();
        assert_eq!(boxes[0].bbox, BoundingBox::new(80, 120, 40, 30));
        assert_eq!(boxes[1].bbox, BoundingBox::new(0, 0, 25, 25));
        assert_eq!(s.add_manual_box(200, 0), None);
    }

    #[test]
    fn remove_prefers_automatic_then_manual() {
        let mut s = session();
        let first = s.last_result().boxes[0];
        let (cx, cy) = (first.x + first.width / 2, first.y + first.height / 2);
        let manual = s.add_manual_box(cx, cy).unwrap();

        assert_eq!(s.remove_box_at(cx, cy), Some(1));
        assert_eq!(s.remove_box_at(cx, cy), Some(manual));
        assert_eq!(s.remove_box_at(cx, cy), None);
        assert_eq!(s.final_boxes().len(), 1);
    }

    #[test]
    fn final_spots_renumber_after_removal() {
        let mut s = session();
        let first = s.last_result().boxes[0];
        s.remove_box_at(first.x, first.y).unwrap();
        s.add_manual_box(100, 10).unwrap();

        let spots = s.final_spots();
        assert_eq!(spots.len(), 2);
        assert_eq!(spots[0].id, 1);
        assert_eq!(spots[0].bbox(), s.last_result().boxes[1]);
        assert_eq!(spots[1].id, 2);
    }

    #[test]
    fn recompute_keeps_manual_and_clears_removed() {
        let mut s = session();
        let first = s.last_result().boxes[0];
        s.remove_box_at(first.x, first.y).unwrap();
        s.add_manual_box(100, 10).unwrap();
        s.recompute().unwrap();
        assert!(s.removed_ids().is_empty());
        assert_eq!(s.manual_boxes().len(), 1);
        assert_eq!(s.final_boxes().len(), 3);
    }

    #[test]
    fn accept_stores_and_reject_does_not() {
        let mut s = session();
        let mut results = StageResults::new();
        let spots = s.accept("1-1", &mut results);
        assert_eq!(s.state(), SessionState::Accepted);
        assert_eq!(results["1-1"], spots);

        s.reject();
        assert_eq!(s.state(), SessionState::Rejected);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn load_next_keeps_profile_and_clears_edits() {
        let mut s = session();
        s.set_profile(ParameterProfile::preset(Sensitivity::High)).unwrap();
        s.add_manual_box(10, 10).unwrap();
        let img = scene();
        s.load_next(ImagePair::reconciled(img.clone(), img)).unwrap();

        assert_eq!(s.state(), SessionState::Idle);
        assert!(s.manual_boxes().is_empty());
        assert!(s.final_boxes().is_empty());
        assert_eq!(s.profile(), &ParameterProfile::preset(Sensitivity::High));
    }
}
