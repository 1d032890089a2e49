//! In-memory board projection and the deterministic combine logic.
//!
//! Merge, link, and resolve broadcasts carry only ids over the wire, so
//! the authoritative engine and every client reconciler must apply the
//! exact same transformation to converge. This module is that single
//! implementation: every mutation is a pure function of the projection
//! state and the broadcast payload.
//!
//! Every guard here is part of the convergence contract. In particular, a
//! merge whose source or target is already merged is rejected, which makes
//! merge idempotent per (source, target) pair on every peer.

use serde::{Deserialize, Serialize};

use crate::note::{Note, NoteStatus, NoteType, Quadrant};
use crate::types::NoteId;

/// Why a mutation was not applied. Rejections are silent no-ops at the
/// protocol level: the engine logs them and broadcasts nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("note {0} does not exist in the current projection")]
    MissingNote(NoteId),
    #[error("note {0} already exists")]
    DuplicateNote(NoteId),
    #[error("note {0} is merged and can no longer be a mutation endpoint")]
    AlreadyMerged(NoteId),
    #[error("notes {0} and {1} are the same type and cannot be linked")]
    SameTypeLink(NoteId, NoteId),
    #[error("a note cannot reference itself")]
    SelfReference,
    #[error("note {0} is not a solution")]
    NotASolution(NoteId),
}

pub type ApplyResult<T = ()> = Result<T, Rejection>;

/// The full note projection for one session.
///
/// Owned exclusively by the mutation engine on the server; every client
/// holds its own mirror and mutates it only through these functions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardState {
    notes: Vec<Note>,
}

impl BoardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_notes(notes: Vec<Note>) -> Self {
        Self { notes }
    }

    /// Swap the entire projection wholesale (session switch / snapshot).
    pub fn replace(&mut self, notes: Vec<Note>) {
        self.notes = notes;
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn get(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Notes still participating in active views, i.e. everything not
    /// merged away. Merged notes are permanently excluded.
    pub fn unmerged(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter().filter(|n| n.status != NoteStatus::Merged)
    }

    /// Unmerged notes of one type (the problem or solution board).
    pub fn notes_of_type(&self, note_type: NoteType) -> impl Iterator<Item = &Note> {
        self.unmerged().filter(move |n| n.note_type == note_type)
    }

    /// Notes with status `ACTIVE` only.
    pub fn active_notes(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter().filter(|n| n.status == NoteStatus::Active)
    }

    /// Resolve a note's link set to the linked notes themselves.
    pub fn linked_notes(&self, id: &str) -> Vec<&Note> {
        match self.get(id) {
            Some(note) => self
                .notes
                .iter()
                .filter(|n| note.linked_note_ids.iter().any(|l| l == &n.id))
                .collect(),
            None => Vec::new(),
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.notes.iter().position(|n| n.id == id)
    }

    /// Append a new note. Re-delivery of an id already present is rejected
    /// rather than duplicated.
    pub fn add_note(&mut self, note: Note) -> ApplyResult {
        if self.get(&note.id).is_some() {
            return Err(Rejection::DuplicateNote(note.id));
        }
        self.notes.push(note);
        Ok(())
    }

    /// Reassign a note's quadrant. Any placement to any other placement,
    /// including back to unsorted; merged notes are no longer movable.
    pub fn update_quadrant(&mut self, id: &str, quadrant: Quadrant) -> ApplyResult {
        let idx = self
            .position(id)
            .ok_or_else(|| Rejection::MissingNote(id.to_owned()))?;
        if self.notes[idx].status == NoteStatus::Merged {
            return Err(Rejection::AlreadyMerged(id.to_owned()));
        }
        self.notes[idx].quadrant = quadrant;
        Ok(())
    }

    /// Absorb `source_id` into `target_id`.
    ///
    /// The source is flagged merged (content untouched, kept for audit);
    /// the target gains a delimited excerpt of the source's content, the
    /// source id on its merge trail, and the sum of both like counters.
    /// Irreversible; there is no unmerge.
    pub fn merge_notes(&mut self, source_id: &str, target_id: &str) -> ApplyResult {
        if source_id == target_id {
            return Err(Rejection::SelfReference);
        }
        let src_idx = self
            .position(source_id)
            .ok_or_else(|| Rejection::MissingNote(source_id.to_owned()))?;
        let tgt_idx = self
            .position(target_id)
            .ok_or_else(|| Rejection::MissingNote(target_id.to_owned()))?;

        // The status re-check is what makes a replayed or raced merge a
        // no-op instead of a double-apply.
        if self.notes[src_idx].status == NoteStatus::Merged {
            return Err(Rejection::AlreadyMerged(source_id.to_owned()));
        }
        if self.notes[tgt_idx].status == NoteStatus::Merged {
            return Err(Rejection::AlreadyMerged(target_id.to_owned()));
        }

        let src_content = self.notes[src_idx].content.clone();
        let src_likes = self.notes[src_idx].likes;

        self.notes[src_idx].status = NoteStatus::Merged;

        let target = &mut self.notes[tgt_idx];
        target.content = format!("{}\n\n[merged from: {src_content}]", target.content);
        target.merged_from_ids.push(source_id.to_owned());
        target.likes += src_likes;
        Ok(())
    }

    /// Record a symmetric link between a problem and a solution.
    /// Idempotent: linking an already-linked pair is a safe no-op.
    pub fn link_notes(&mut self, id1: &str, id2: &str) -> ApplyResult {
        if id1 == id2 {
            return Err(Rejection::SelfReference);
        }
        let idx1 = self
            .position(id1)
            .ok_or_else(|| Rejection::MissingNote(id1.to_owned()))?;
        let idx2 = self
            .position(id2)
            .ok_or_else(|| Rejection::MissingNote(id2.to_owned()))?;

        if self.notes[idx1].status == NoteStatus::Merged {
            return Err(Rejection::AlreadyMerged(id1.to_owned()));
        }
        if self.notes[idx2].status == NoteStatus::Merged {
            return Err(Rejection::AlreadyMerged(id2.to_owned()));
        }
        if self.notes[idx1].note_type != self.notes[idx2].note_type.opposite() {
            return Err(Rejection::SameTypeLink(id1.to_owned(), id2.to_owned()));
        }

        if !self.notes[idx1].linked_note_ids.iter().any(|l| l == id2) {
            self.notes[idx1].linked_note_ids.push(id2.to_owned());
        }
        if !self.notes[idx2].linked_note_ids.iter().any(|l| l == id1) {
            self.notes[idx2].linked_note_ids.push(id1.to_owned());
        }
        Ok(())
    }

    /// Remove a link from both endpoints. Idempotent; removal proceeds on
    /// whichever endpoints still exist so the mirror never goes one-sided.
    pub fn unlink_notes(&mut self, id1: &str, id2: &str) -> ApplyResult {
        let idx1 = self.position(id1);
        let idx2 = self.position(id2);
        if idx1.is_none() && idx2.is_none() {
            return Err(Rejection::MissingNote(id1.to_owned()));
        }
        if let Some(i) = idx1 {
            self.notes[i].linked_note_ids.retain(|l| l != id2);
        }
        if let Some(i) = idx2 {
            self.notes[i].linked_note_ids.retain(|l| l != id1);
        }
        Ok(())
    }

    /// Mark a solution resolved and cascade to every linked problem.
    ///
    /// The cascade traverses the link relation at call time, so every peer
    /// recomputes the same multi-note transition from the solution id
    /// alone. Merged problems keep their terminal status. Returns the ids
    /// of the problems that were transitioned.
    pub fn resolve_solution(&mut self, solution_id: &str) -> ApplyResult<Vec<NoteId>> {
        let idx = self
            .position(solution_id)
            .ok_or_else(|| Rejection::MissingNote(solution_id.to_owned()))?;
        if self.notes[idx].status == NoteStatus::Merged {
            return Err(Rejection::AlreadyMerged(solution_id.to_owned()));
        }
        if self.notes[idx].note_type != NoteType::Solution {
            return Err(Rejection::NotASolution(solution_id.to_owned()));
        }

        self.notes[idx].status = NoteStatus::Resolved;
        let linked = self.notes[idx].linked_note_ids.clone();

        let mut resolved = Vec::new();
        for note in &mut self.notes {
            if linked.iter().any(|l| l == &note.id)
                && note.note_type == NoteType::Problem
                && note.status != NoteStatus::Merged
            {
                note.status = NoteStatus::Resolved;
                resolved.push(note.id.clone());
            }
        }
        Ok(resolved)
    }

    /// Increment a note's like counter by exactly one.
    pub fn like_note(&mut self, id: &str) -> ApplyResult {
        let idx = self
            .position(id)
            .ok_or_else(|| Rejection::MissingNote(id.to_owned()))?;
        self.notes[idx].likes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::Category;
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};

    fn note(id: &str, note_type: NoteType) -> Note {
        Note {
            id: id.into(),
            content: format!("content of {id}"),
            author: "Ana".into(),
            avatar_url: None,
            category: Category::Process,
            note_type,
            quadrant: Quadrant::Unsorted,
            status: NoteStatus::Active,
            timestamp: Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap(),
            likes: 0,
            linked_note_ids: vec![],
            merged_from_ids: vec![],
            created_by_user_id: None,
            created_by_phone: None,
            created_by_name: None,
            session_id: None,
        }
    }

    fn board(notes: Vec<Note>) -> BoardState {
        BoardState::from_notes(notes)
    }

    #[test]
    fn add_rejects_duplicate_id() {
        let mut b = board(vec![note("n1", NoteType::Problem)]);
        assert_matches!(
            b.add_note(note("n1", NoteType::Problem)),
            Err(Rejection::DuplicateNote(_))
        );
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn quadrant_moves_any_to_any() {
        let mut b = board(vec![note("n1", NoteType::Problem)]);
        b.update_quadrant("n1", Quadrant::Q3).unwrap();
        assert_eq!(b.get("n1").unwrap().quadrant, Quadrant::Q3);
        b.update_quadrant("n1", Quadrant::Unsorted).unwrap();
        assert_eq!(b.get("n1").unwrap().quadrant, Quadrant::Unsorted);
        assert_matches!(
            b.update_quadrant("nope", Quadrant::Q1),
            Err(Rejection::MissingNote(_))
        );
    }

    #[test]
    fn merge_combines_content_likes_and_trail() {
        let mut src = note("n1", NoteType::Problem);
        src.likes = 3;
        let mut tgt = note("n2", NoteType::Problem);
        tgt.likes = 2;
        let mut b = board(vec![src, tgt]);

        b.merge_notes("n1", "n2").unwrap();

        let n1 = b.get("n1").unwrap();
        assert_eq!(n1.status, NoteStatus::Merged);
        assert_eq!(n1.content, "content of n1"); // source content untouched

        let n2 = b.get("n2").unwrap();
        assert_eq!(n2.content, "content of n2\n\n[merged from: content of n1]");
        assert_eq!(n2.merged_from_ids, vec!["n1".to_owned()]);
        assert_eq!(n2.likes, 5);
    }

    #[test]
    fn merge_is_idempotent_per_pair() {
        let mut src = note("n1", NoteType::Problem);
        src.likes = 3;
        let mut tgt = note("n2", NoteType::Problem);
        tgt.likes = 2;
        let mut b = board(vec![src, tgt]);

        b.merge_notes("n1", "n2").unwrap();
        // Replayed merge: must not double-append content or double-sum likes.
        assert_matches!(
            b.merge_notes("n1", "n2"),
            Err(Rejection::AlreadyMerged(id)) if id == "n1"
        );
        let n2 = b.get("n2").unwrap();
        assert_eq!(n2.likes, 5);
        assert_eq!(n2.merged_from_ids.len(), 1);
        assert_eq!(n2.content.matches("[merged from:").count(), 1);
    }

    #[test]
    fn merged_note_is_excluded_and_immutable() {
        let mut b = board(vec![
            note("n1", NoteType::Problem),
            note("n2", NoteType::Problem),
            note("s1", NoteType::Solution),
        ]);
        b.merge_notes("n1", "n2").unwrap();

        assert!(b.unmerged().all(|n| n.id != "n1"));
        assert!(b.notes_of_type(NoteType::Problem).all(|n| n.id != "n1"));
        // ...but the note itself is never deleted.
        assert!(b.get("n1").is_some());

        assert_matches!(
            b.update_quadrant("n1", Quadrant::Q1),
            Err(Rejection::AlreadyMerged(_))
        );
        assert_matches!(b.link_notes("s1", "n1"), Err(Rejection::AlreadyMerged(_)));
        assert_matches!(b.merge_notes("n2", "n1"), Err(Rejection::AlreadyMerged(_)));
    }

    #[test]
    fn link_is_symmetric_and_idempotent() {
        let mut b = board(vec![
            note("p1", NoteType::Problem),
            note("s1", NoteType::Solution),
        ]);
        b.link_notes("p1", "s1").unwrap();
        b.link_notes("s1", "p1").unwrap(); // either direction, still one link

        assert_eq!(b.get("p1").unwrap().linked_note_ids, vec!["s1".to_owned()]);
        assert_eq!(b.get("s1").unwrap().linked_note_ids, vec!["p1".to_owned()]);
    }

    #[test]
    fn link_rejects_same_type_pairs() {
        let mut b = board(vec![
            note("p1", NoteType::Problem),
            note("p2", NoteType::Problem),
        ]);
        assert_matches!(b.link_notes("p1", "p2"), Err(Rejection::SameTypeLink(_, _)));
        assert!(b.get("p1").unwrap().linked_note_ids.is_empty());
    }

    #[test]
    fn unlink_clears_both_sides() {
        let mut b = board(vec![
            note("p1", NoteType::Problem),
            note("s1", NoteType::Solution),
        ]);
        b.link_notes("p1", "s1").unwrap();
        b.unlink_notes("s1", "p1").unwrap();
        assert!(b.get("p1").unwrap().linked_note_ids.is_empty());
        assert!(b.get("s1").unwrap().linked_note_ids.is_empty());
        // Unlinking an already-unlinked pair is a safe no-op.
        b.unlink_notes("p1", "s1").unwrap();
    }

    #[test]
    fn link_symmetry_survives_mixed_sequences() {
        let mut b = board(vec![
            note("p1", NoteType::Problem),
            note("p2", NoteType::Problem),
            note("s1", NoteType::Solution),
        ]);
        b.link_notes("p1", "s1").unwrap();
        b.link_notes("p2", "s1").unwrap();
        b.unlink_notes("p1", "s1").unwrap();
        b.link_notes("p1", "s1").unwrap();
        b.merge_notes("p2", "p1").unwrap();

        for n in b.notes() {
            for l in &n.linked_note_ids {
                let other = b.get(l).expect("link target exists");
                assert!(
                    other.linked_note_ids.iter().any(|x| x == &n.id),
                    "link {} -> {} is not mirrored",
                    n.id,
                    l
                );
            }
        }
    }

    #[test]
    fn resolve_cascades_to_linked_problems_only() {
        let mut b = board(vec![
            note("p1", NoteType::Problem),
            note("p2", NoteType::Problem),
            note("p3", NoteType::Problem), // unrelated, must stay active
            note("s1", NoteType::Solution),
        ]);
        b.link_notes("p1", "s1").unwrap();
        b.link_notes("p2", "s1").unwrap();

        let resolved = b.resolve_solution("s1").unwrap();
        assert_eq!(resolved, vec!["p1".to_owned(), "p2".to_owned()]);

        assert_eq!(b.get("s1").unwrap().status, NoteStatus::Resolved);
        assert_eq!(b.get("p1").unwrap().status, NoteStatus::Resolved);
        assert_eq!(b.get("p2").unwrap().status, NoteStatus::Resolved);
        assert_eq!(b.get("p3").unwrap().status, NoteStatus::Active);
    }

    #[test]
    fn resolve_rejects_non_solutions() {
        let mut b = board(vec![note("p1", NoteType::Problem)]);
        assert_matches!(b.resolve_solution("p1"), Err(Rejection::NotASolution(_)));
    }

    #[test]
    fn resolve_skips_merged_problems() {
        let mut b = board(vec![
            note("p1", NoteType::Problem),
            note("p2", NoteType::Problem),
            note("s1", NoteType::Solution),
        ]);
        b.link_notes("p1", "s1").unwrap();
        b.merge_notes("p1", "p2").unwrap();

        let resolved = b.resolve_solution("s1").unwrap();
        assert!(resolved.is_empty());
        // Merged stays terminal; it is never overwritten to resolved.
        assert_eq!(b.get("p1").unwrap().status, NoteStatus::Merged);
    }

    #[test]
    fn like_increments_by_one() {
        let mut b = board(vec![note("n1", NoteType::Problem)]);
        b.like_note("n1").unwrap();
        b.like_note("n1").unwrap();
        assert_eq!(b.get("n1").unwrap().likes, 2);
        assert_matches!(b.like_note("nope"), Err(Rejection::MissingNote(_)));
    }

    #[test]
    fn replace_swaps_the_projection_wholesale() {
        let mut b = board(vec![note("n1", NoteType::Problem)]);
        b.replace(vec![note("m1", NoteType::Solution)]);
        assert!(b.get("n1").is_none());
        assert!(b.get("m1").is_some());
        // An empty session replaces down to an empty projection.
        b.replace(Vec::new());
        assert!(b.is_empty());
    }

    // The end-to-end scenario from the design discussion: add, merge,
    // link, resolve -- applied on a second board from id-only payloads to
    // demonstrate convergence.
    #[test]
    fn id_only_replay_converges() {
        let mut server = board(vec![]);
        server.add_note(note("n1", NoteType::Problem)).unwrap();
        server.add_note(note("n2", NoteType::Problem)).unwrap();
        server.add_note(note("s1", NoteType::Solution)).unwrap();

        // A peer that received the three note-added broadcasts.
        let mut peer = server.clone();

        server.merge_notes("n1", "n2").unwrap();
        server.link_notes("s1", "n2").unwrap();
        server.resolve_solution("s1").unwrap();

        // The peer sees only the id pairs.
        peer.merge_notes("n1", "n2").unwrap();
        peer.link_notes("s1", "n2").unwrap();
        peer.resolve_solution("s1").unwrap();

        assert_eq!(server, peer);
        assert_eq!(peer.get("n2").unwrap().status, NoteStatus::Resolved);
        assert_eq!(peer.get("s1").unwrap().status, NoteStatus::Resolved);
        assert_eq!(peer.get("n1").unwrap().status, NoteStatus::Merged);
    }
}
