// Roel Kluin, 2023, GPL v3

//! The only writer of the graph.
//!
//! A mutation runs through `Stage`s in order. Ids are reserved and new records installed
//! first; then, holding the slot guards of every existing vertex it touches (ascending id
//! order), it re-checks its preconditions, edits adjacency, pairs the new twins and draws its
//! delivery ticket. Until the ticket is drawn every step is undone when the mutation fails.
//! After that the events go out and the removed entities are retired: records dropped and ids
//! released, only once every handler has seen their Deleting event.

use crate::edge_store::EdgeRecord;
use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::handlers::{self, GraphEvent, Ticket};
use crate::ids::{EdgeId, EntityId, VertexId};
use crate::sequence::Sequence;
use crate::table::Locked;
use crate::vertex_store::{Side, VertexRecord};
use ahash::AHashSet;
use smallvec::{smallvec, SmallVec};
use std::collections::VecDeque;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Stage {
    Begin,
    ReserveIds,
    InstallRecords,
    UpdateAdjacency,
    PairConjugates,
    NotifyObservers,
    Commit,
}

type Ids<I> = SmallVec<[I; 4]>;
type VertexLocks<'a> = Locked<'a, VertexId, VertexRecord>;

struct Mutation<'g> {
    graph: &'g Graph,
    op: &'static str,
    stage: Stage,
    reserved_vertices: Ids<VertexId>,
    reserved_edges: Ids<EdgeId>,
    installed_vertices: Ids<VertexId>,
    installed_edges: Ids<EdgeId>,
    paired_vertices: Ids<VertexId>,
    paired_edges: Ids<EdgeId>,
    retiring_vertices: Ids<VertexId>,
    retiring_edges: Ids<EdgeId>,
    sealed: bool,
}

#[derive(Clone, Copy, Debug)]
enum Edit {
    Pushed(VertexId, Side),
    Removed(VertexId, Side, usize, EdgeId),
    Replaced(VertexId, Side, usize, EdgeId),
}

/// Adjacency edits made under the vertex guards, so they can be reverted under the same guards.
#[derive(Default)]
struct AdjacencyLog {
    edits: Vec<Edit>,
}

impl AdjacencyLog {
    fn push(&mut self, vs: &mut VertexLocks<'_>, v: VertexId, side: Side, e: EdgeId) -> Result<()> {
        vs.get_mut(v)?.list_mut(side).push(e);
        self.edits.push(Edit::Pushed(v, side));
        Ok(())
    }
    fn find(vs: &mut VertexLocks<'_>, v: VertexId, side: Side, e: EdgeId) -> Result<usize> {
        vs.get_mut(v)?
            .list_mut(side)
            .iter()
            .position(|&x| x == e)
            .ok_or_else(|| GraphError::invariant("edge missing from adjacency", vec![v.raw(), e.raw()]))
    }
    fn remove(&mut self, vs: &mut VertexLocks<'_>, v: VertexId, side: Side, e: EdgeId) -> Result<()> {
        let i = Self::find(vs, v, side, e)?;
        vs.get_mut(v)?.list_mut(side).remove(i);
        self.edits.push(Edit::Removed(v, side, i, e));
        Ok(())
    }
    fn replace(
        &mut self,
        vs: &mut VertexLocks<'_>,
        v: VertexId,
        side: Side,
        old: EdgeId,
        new: EdgeId,
    ) -> Result<()> {
        let i = Self::find(vs, v, side, old)?;
        vs.get_mut(v)?.list_mut(side)[i] = new;
        self.edits.push(Edit::Replaced(v, side, i, old));
        Ok(())
    }
    fn revert(self, vs: &mut VertexLocks<'_>) {
        for edit in self.edits.into_iter().rev() {
            let (v, side) = match edit {
                Edit::Pushed(v, side) | Edit::Removed(v, side, ..) | Edit::Replaced(v, side, ..) => {
                    (v, side)
                }
            };
            let Ok(record) = vs.get_mut(v) else { continue };
            let list = record.list_mut(side);
            match edit {
                Edit::Pushed(..) => {
                    list.pop();
                }
                Edit::Removed(_, _, i, e) => list.insert(i, e),
                Edit::Replaced(_, _, i, old) => list[i] = old,
            }
        }
    }
}

impl<'g> Mutation<'g> {
    fn begin(graph: &'g Graph, op: &'static str) -> Result<Self> {
        precondition!(
            !handlers::delivering(),
            "{op} called from inside a graph event handler"
        );
        Ok(Mutation {
            graph,
            op,
            stage: Stage::Begin,
            reserved_vertices: SmallVec::new(),
            reserved_edges: SmallVec::new(),
            installed_vertices: SmallVec::new(),
            installed_edges: SmallVec::new(),
            paired_vertices: SmallVec::new(),
            paired_edges: SmallVec::new(),
            retiring_vertices: SmallVec::new(),
            retiring_edges: SmallVec::new(),
            sealed: false,
        })
    }
    fn advance(&mut self, stage: Stage) {
        dbg_assert!(stage >= self.stage, "{} went back from {:?} to {:?}", self.op, self.stage, stage);
        dbg_print!("{}: {:?}", self.op, stage);
        self.stage = stage;
    }

    fn reserve_vertex(&mut self) -> Result<VertexId> {
        let v = self.graph.vertices.reserve()?;
        self.reserved_vertices.push(v);
        Ok(v)
    }
    fn reserve_edge(&mut self) -> Result<EdgeId> {
        let e = self.graph.edges.reserve()?;
        self.reserved_edges.push(e);
        Ok(e)
    }
    fn install_vertex(&mut self, v: VertexId, record: VertexRecord) -> Result<()> {
        self.graph.vertices.install(v, record)?;
        self.installed_vertices.push(v);
        Ok(())
    }
    fn install_edge(&mut self, e: EdgeId, record: EdgeRecord) -> Result<()> {
        self.graph.edges.install(e, record)?;
        self.installed_edges.push(e);
        Ok(())
    }
    fn pair_vertices(&mut self, a: VertexId, b: VertexId) -> Result<()> {
        self.graph.vertex_twins.pair(a, b)?;
        self.paired_vertices.push(a);
        Ok(())
    }
    fn pair_edges(&mut self, a: EdgeId, b: EdgeId) -> Result<()> {
        self.graph.edge_twins.pair(a, b)?;
        self.paired_edges.push(a);
        Ok(())
    }

    /// Mark the entities this mutation deletes, so that from here to `publish` no other writer
    /// can lock them. Fails with `Stale` when another mutation got there first.
    fn retire(
        &mut self,
        vs: &mut VertexLocks<'_>,
        edges: &[EdgeId],
        vertices: &[VertexId],
    ) -> Result<()> {
        for &e in edges {
            self.graph.edges.retire(e)?;
            self.retiring_edges.push(e);
        }
        for &v in vertices {
            vs.retire(v)?;
            self.retiring_vertices.push(v);
        }
        Ok(())
    }
    fn unretire(&mut self, vs: &mut VertexLocks<'_>) {
        for e in self.retiring_edges.drain(..) {
            self.graph.edges.unretire(e);
        }
        for v in self.retiring_vertices.drain(..) {
            vs.unretire(v);
        }
    }

    /// The mutation has taken effect: no more rollback. Called with the vertex guards held, so
    /// delivery order follows the order in which mutations touched the graph.
    fn seal(&mut self) -> Ticket<'g> {
        self.sealed = true;
        self.graph.handlers().ticket()
    }

    /// Deliver `events`, then retire `edges` and `vertices`: unpair, drop the record, free the
    /// id. Retiring happens even when a handler fails; the fault is returned afterwards.
    fn publish(
        mut self,
        ticket: Ticket<'g>,
        events: &[GraphEvent],
        edges: &[EdgeId],
        vertices: &[VertexId],
    ) -> Result<()> {
        self.advance(Stage::NotifyObservers);
        let delivered = self.graph.handlers().deliver(self.graph, ticket, events);
        self.advance(Stage::Commit);
        let mut retired = Ok(());
        for &e in edges {
            self.graph.edge_twins.unpair(e);
            if let Err(err) = self.graph.edges.take(e) {
                retired = retired.and(Err(err));
                continue;
            }
            self.graph.edges.release(e);
        }
        for &v in vertices {
            self.graph.vertex_twins.unpair(v);
            if let Err(err) = self.graph.vertices.take(v) {
                retired = retired.and(Err(err));
                continue;
            }
            self.graph.vertices.release(v);
        }
        delivered.and(retired)
    }
}

impl Drop for Mutation<'_> {
    fn drop(&mut self) {
        if self.sealed
            || (self.reserved_vertices.is_empty()
                && self.reserved_edges.is_empty()
                && self.retiring_vertices.is_empty()
                && self.retiring_edges.is_empty())
        {
            return;
        }
        warn!(op = self.op, stage = ?self.stage, "rolling back mutation");
        let graph = self.graph;
        for &e in &self.retiring_edges {
            graph.edges.unretire(e);
        }
        for &v in &self.retiring_vertices {
            graph.vertices.unretire(v);
        }
        for &e in &self.paired_edges {
            graph.edge_twins.unpair(e);
        }
        for &v in &self.paired_vertices {
            graph.vertex_twins.unpair(v);
        }
        for &e in &self.installed_edges {
            let _ = graph.edges.take(e);
        }
        for &v in &self.installed_vertices {
            let _ = graph.vertices.take(v);
        }
        for &e in &self.reserved_edges {
            graph.edges.release(e);
        }
        for &v in &self.reserved_vertices {
            graph.vertices.release(v);
        }
    }
}

impl Graph {
    /// A vertex labelled `label` and its twin, or one self-conjugate vertex when `label` is a
    /// palindrome.
    pub fn add_vertex(&self, label: Sequence) -> Result<VertexId> {
        let mut m = Mutation::begin(self, "add_vertex")?;
        precondition!(
            label.len() == self.k(),
            "vertex label {label} is not a {}-mer",
            self.k()
        );
        let palindromic = label.is_palindrome();

        m.advance(Stage::ReserveIds);
        let v = m.reserve_vertex()?;
        let t = if palindromic { v } else { m.reserve_vertex()? };

        m.advance(Stage::InstallRecords);
        if !palindromic {
            m.install_vertex(t, VertexRecord::new(label.reverse_complement(), false))?;
        }
        m.install_vertex(v, VertexRecord::new(label, palindromic))?;

        m.advance(Stage::UpdateAdjacency);
        m.advance(Stage::PairConjugates);
        m.pair_vertices(v, t)?;
        let ticket = m.seal();

        let mut events = vec![GraphEvent::AddingVertex(v)];
        if t != v {
            events.push(GraphEvent::AddingVertex(t));
        }
        m.publish(ticket, &events, &[], &[])?;
        Ok(v)
    }

    /// An edge spelling `sequence` from `from` to `to`, and its twin. The new edges go to the end
    /// of the adjacency lists. A palindromic `sequence` makes one self-conjugate edge, which
    /// needs `from = twin(to)`.
    pub fn add_edge(&self, from: VertexId, to: VertexId, sequence: Sequence) -> Result<EdgeId> {
        let mut m = Mutation::begin(self, "add_edge")?;
        let k = self.k();
        precondition!(
            sequence.len() > k,
            "edge sequence of length {} is shorter than a {}-mer edge",
            sequence.len(),
            k + 1
        );
        dbg_assert!(
            sequence.starts_with(&self.label(from)?) && sequence.ends_with(&self.label(to)?),
            "{} does not join {} and {}",
            sequence,
            from,
            to
        );
        let twin_from = self.conjugate_vertex(from)?;
        let twin_to = self.conjugate_vertex(to)?;
        let palindromic = sequence.is_palindrome();
        precondition!(
            !palindromic || from == twin_to,
            "palindromic edge {sequence} must join {from} to its twin, not {to}"
        );

        m.advance(Stage::ReserveIds);
        let e = m.reserve_edge()?;
        let t = if palindromic { e } else { m.reserve_edge()? };

        m.advance(Stage::InstallRecords);
        if !palindromic {
            let rc = sequence.reverse_complement();
            m.install_edge(t, EdgeRecord::new(twin_to, twin_from, rc, false))?;
        }
        m.install_edge(e, EdgeRecord::new(from, to, sequence, palindromic))?;

        let locks = vec![from, to, twin_from, twin_to];
        let ticket = self.vertices.with_locked(&locks, |vs| {
            m.advance(Stage::UpdateAdjacency);
            let mut log = AdjacencyLog::default();
            let applied = (|| -> Result<()> {
                log.push(vs, from, Side::Out, e)?;
                log.push(vs, to, Side::In, e)?;
                if t != e {
                    log.push(vs, twin_to, Side::Out, t)?;
                    log.push(vs, twin_from, Side::In, t)?;
                }
                m.advance(Stage::PairConjugates);
                m.pair_edges(e, t)
            })();
            if let Err(err) = applied {
                log.revert(vs);
                m.unretire(vs);
                return Err(err);
            }
            Ok(m.seal())
        })?;

        let mut events = vec![GraphEvent::AddingEdge(e)];
        if t != e {
            events.push(GraphEvent::AddingEdge(t));
        }
        m.publish(ticket, &events, &[], &[])?;
        Ok(e)
    }

    /// Merge `u -e1-> v -e2-> w` into one edge.
    pub fn merge(&self, e1: EdgeId, e2: EdgeId) -> Result<EdgeId> {
        self.merge_path(&[e1, e2])
    }

    /// Replace the path `path` by one edge with the concatenated sequence, and its twin path by
    /// the twin of that edge. Every interior vertex must have exactly the path's edges at it.
    /// Observers see one MergingPaths per strand; the new edge takes the place of the path in
    /// the adjacency lists of both ends.
    pub fn merge_path(&self, path: &[EdgeId]) -> Result<EdgeId> {
        let mut m = Mutation::begin(self, "merge_path")?;
        let k = self.k();
        precondition!(path.len() >= 2, "merging a path of {} edges", path.len());

        let mut records = Vec::with_capacity(path.len());
        let mut twins: Ids<EdgeId> = SmallVec::with_capacity(path.len());
        let mut seen = AHashSet::with_capacity(2 * path.len());
        for &e in path {
            let t = self.conjugate_edge(e)?;
            precondition!(t != e, "cannot merge self-conjugate edge {e}");
            precondition!(
                seen.insert(e) && seen.insert(t),
                "edge {e} or its twin occurs twice in the path"
            );
            records.push(self.edge(e)?);
            twins.push(t);
        }
        let u = records[0].from();
        let w = records[path.len() - 1].to();
        let (twin_u, twin_w) = (self.conjugate_vertex(u)?, self.conjugate_vertex(w)?);

        let mut interior: Ids<VertexId> = SmallVec::with_capacity(path.len() - 1);
        let mut interior_twins: Ids<VertexId> = SmallVec::with_capacity(path.len() - 1);
        let mut inner = AHashSet::with_capacity(2 * path.len());
        for (i, pair) in records.windows(2).enumerate() {
            let v = pair[0].to();
            precondition!(
                v == pair[1].from(),
                "{} ends at {v}, {} starts at {}",
                path[i],
                path[i + 1],
                pair[1].from()
            );
            let tv = self.conjugate_vertex(v)?;
            precondition!(
                inner.insert(v) && inner.insert(tv),
                "interior vertex {v} or its twin recurs, or is palindromic"
            );
            interior.push(v);
            interior_twins.push(tv);
        }
        precondition!(
            [u, w, twin_u, twin_w].iter().all(|x| !inner.contains(x)),
            "path ends {u}, {w} or their twins are interior to the path"
        );

        let merged = records[1..].iter().fold(records[0].sequence().clone(), |acc, r| {
            acc.merge_overlapping(r.sequence(), k)
        });
        let twin_path: SmallVec<[EdgeId; 4]> = twins.iter().rev().copied().collect();

        m.advance(Stage::ReserveIds);
        let e = m.reserve_edge()?;
        let t = m.reserve_edge()?;

        m.advance(Stage::InstallRecords);
        let rc = merged.reverse_complement();
        m.install_edge(t, EdgeRecord::new(twin_w, twin_u, rc, false))?;
        m.install_edge(e, EdgeRecord::new(u, w, merged, false))?;

        let mut retired_edges = Vec::with_capacity(2 * path.len());
        for (&old, &twin) in path.iter().zip(&twins) {
            retired_edges.extend([old, twin]);
        }
        let mut retired_vertices = Vec::with_capacity(2 * interior.len());
        for (&v, &tv) in interior.iter().zip(&interior_twins) {
            retired_vertices.extend([v, tv]);
        }

        let mut locks = vec![u, w, twin_u, twin_w];
        locks.extend(interior.iter().chain(&interior_twins));
        let ticket = self.vertices.with_locked(&locks, |vs| {
            for (i, (&v, &tv)) in interior.iter().zip(&interior_twins).enumerate() {
                let (e_in, e_out) = (path[i], path[i + 1]);
                let (t_in, t_out) = (twins[i + 1], twins[i]);
                let r = vs.get(v)?;
                precondition!(
                    r.incoming() == [e_in] && r.outgoing() == [e_out],
                    "{v} is not a unipath vertex between {e_in} and {e_out}"
                );
                let r = vs.get(tv)?;
                precondition!(
                    r.incoming() == [t_in] && r.outgoing() == [t_out],
                    "{tv} is not a unipath vertex between {t_in} and {t_out}"
                );
            }

            m.advance(Stage::UpdateAdjacency);
            let mut log = AdjacencyLog::default();
            let applied = (|| -> Result<()> {
                m.retire(vs, &retired_edges, &retired_vertices)?;
                log.replace(vs, u, Side::Out, path[0], e)?;
                log.replace(vs, w, Side::In, path[path.len() - 1], e)?;
                log.replace(vs, twin_w, Side::Out, twin_path[0], t)?;
                log.replace(vs, twin_u, Side::In, twin_path[path.len() - 1], t)?;
                for (i, (&v, &tv)) in interior.iter().zip(&interior_twins).enumerate() {
                    log.remove(vs, v, Side::In, path[i])?;
                    log.remove(vs, v, Side::Out, path[i + 1])?;
                    log.remove(vs, tv, Side::In, twins[i + 1])?;
                    log.remove(vs, tv, Side::Out, twins[i])?;
                }
                m.advance(Stage::PairConjugates);
                m.pair_edges(e, t)
            })();
            if let Err(err) = applied {
                log.revert(vs);
                m.unretire(vs);
                return Err(err);
            }
            Ok(m.seal())
        })?;

        let mut events = vec![
            GraphEvent::AddingEdge(e),
            GraphEvent::AddingEdge(t),
            GraphEvent::MergingPaths {
                old: path.iter().copied().collect(),
                new: e,
            },
            GraphEvent::MergingPaths {
                old: twin_path,
                new: t,
            },
        ];
        events.extend(retired_edges.iter().map(|&old| GraphEvent::DeletingEdge(old)));
        events.extend(retired_vertices.iter().map(|&v| GraphEvent::DeletingVertex(v)));
        m.publish(ticket, &events, &retired_edges, &retired_vertices)?;
        Ok(e)
    }

    /// Merge the longest unipath running through `v`, if v can be merged across. Returns the
    /// merged edge.
    pub fn compress_vertex(&self, v: VertexId) -> Result<Option<EdgeId>> {
        let Some((e_in, e_out)) = self.pass_through(v)? else {
            return Ok(None);
        };
        let mut path: VecDeque<EdgeId> = VecDeque::from([e_in, e_out]);
        let mut edges_seen = AHashSet::new();
        for e in [e_in, e_out] {
            edges_seen.insert(e);
            edges_seen.insert(self.conjugate_edge(e)?);
        }
        let mut inner = AHashSet::from([v, self.conjugate_vertex(v)?]);

        // a candidate may extend the path when it and its twin are new to it, as are the
        // edge it adds and that edge's twin
        let extends = |x: VertexId,
                       next: EdgeId,
                       inner: &AHashSet<VertexId>,
                       edges_seen: &AHashSet<EdgeId>|
         -> Result<bool> {
            Ok(!inner.contains(&x)
                && !inner.contains(&self.conjugate_vertex(x)?)
                && !edges_seen.contains(&next)
                && !edges_seen.contains(&self.conjugate_edge(next)?))
        };
        loop {
            let Some(&last) = path.back() else { break };
            let x = self.edge_end(last)?;
            let Some((_, next)) = self.pass_through(x)? else { break };
            if !extends(x, next, &inner, &edges_seen)? {
                break;
            }
            let end = self.edge_end(next)?;
            let front_start = path.front().map(|&e| self.edge_start(e)).transpose()?;
            let twin_x = Some(self.conjugate_vertex(x)?);
            if inner.contains(&end) || Some(x) == front_start || twin_x == front_start {
                break;
            }
            inner.extend([x, self.conjugate_vertex(x)?]);
            edges_seen.extend([next, self.conjugate_edge(next)?]);
            path.push_back(next);
        }
        loop {
            let Some(&first) = path.front() else { break };
            let x = self.edge_start(first)?;
            let Some((prev, _)) = self.pass_through(x)? else { break };
            if !extends(x, prev, &inner, &edges_seen)? {
                break;
            }
            let start = self.edge_start(prev)?;
            let back_end = path.back().map(|&e| self.edge_end(e)).transpose()?;
            let twin_x = Some(self.conjugate_vertex(x)?);
            if inner.contains(&start) || Some(x) == back_end || twin_x == back_end {
                break;
            }
            inner.extend([x, self.conjugate_vertex(x)?]);
            edges_seen.extend([prev, self.conjugate_edge(prev)?]);
            path.push_front(prev);
        }
        let ends = [
            self.edge_start(path[0])?,
            self.edge_end(path[path.len() - 1])?,
        ];
        if ends.iter().any(|x| inner.contains(x)) {
            return Ok(None);
        }
        let path: Vec<EdgeId> = path.into_iter().collect();
        self.merge_path(&path).map(Some)
    }

    /// Cut `e` after `pos` k-mers: `from -e1-> v_mid -e2-> to`, where the label of `v_mid` is
    /// the k-mer at `pos`. The twin is cut at `length - pos`.
    pub fn split_edge(&self, e: EdgeId, pos: usize) -> Result<(EdgeId, EdgeId, VertexId)> {
        let mut m = Mutation::begin(self, "split_edge")?;
        let k = self.k();
        let t = self.conjugate_edge(e)?;
        precondition!(t != e, "cannot split self-conjugate edge {e}");
        let record = self.edge(e)?;
        let length = record.length(k);
        precondition!(
            0 < pos && pos < length,
            "split position {pos} outside (0, {length}) of {e}"
        );
        let (from, to) = (record.from(), record.to());
        let (twin_from, twin_to) = (self.conjugate_vertex(from)?, self.conjugate_vertex(to)?);
        let seq = record.sequence();
        let first = seq.subseq(0, pos + k);
        let second = seq.subseq(pos, seq.len());
        let label = seq.subseq(pos, pos + k);
        let palindromic = label.is_palindrome();

        m.advance(Stage::ReserveIds);
        let v_mid = m.reserve_vertex()?;
        let t_mid = if palindromic { v_mid } else { m.reserve_vertex()? };
        let e1 = m.reserve_edge()?;
        let t1 = m.reserve_edge()?;
        let e2 = m.reserve_edge()?;
        let t2 = m.reserve_edge()?;

        // new vertices have no other edges, so they are installed complete
        m.advance(Stage::InstallRecords);
        if palindromic {
            let record = VertexRecord::with_adjacency(
                label,
                smallvec![e2, t1],
                smallvec![e1, t2],
                true,
            );
            m.install_vertex(v_mid, record)?;
        } else {
            let rc = label.reverse_complement();
            m.install_vertex(
                t_mid,
                VertexRecord::with_adjacency(rc, smallvec![t1], smallvec![t2], false),
            )?;
            m.install_vertex(
                v_mid,
                VertexRecord::with_adjacency(label, smallvec![e2], smallvec![e1], false),
            )?;
        }
        let (rc_first, rc_second) = (first.reverse_complement(), second.reverse_complement());
        m.install_edge(e1, EdgeRecord::new(from, v_mid, first, false))?;
        m.install_edge(t1, EdgeRecord::new(t_mid, twin_from, rc_first, false))?;
        m.install_edge(e2, EdgeRecord::new(v_mid, to, second, false))?;
        m.install_edge(t2, EdgeRecord::new(twin_to, t_mid, rc_second, false))?;

        let locks = vec![from, to, twin_from, twin_to];
        let ticket = self.vertices.with_locked(&locks, |vs| {
            m.advance(Stage::UpdateAdjacency);
            let mut log = AdjacencyLog::default();
            let applied = (|| -> Result<()> {
                m.retire(vs, &[e, t], &[])?;
                log.replace(vs, from, Side::Out, e, e1)?;
                log.replace(vs, to, Side::In, e, e2)?;
                log.replace(vs, twin_to, Side::Out, t, t2)?;
                log.replace(vs, twin_from, Side::In, t, t1)?;
                m.advance(Stage::PairConjugates);
                m.pair_vertices(v_mid, t_mid)?;
                m.pair_edges(e1, t1)?;
                m.pair_edges(e2, t2)
            })();
            if let Err(err) = applied {
                log.revert(vs);
                m.unretire(vs);
                return Err(err);
            }
            Ok(m.seal())
        })?;

        let mut events = vec![GraphEvent::AddingVertex(v_mid)];
        if t_mid != v_mid {
            events.push(GraphEvent::AddingVertex(t_mid));
        }
        events.extend([
            GraphEvent::AddingEdge(e1),
            GraphEvent::AddingEdge(t1),
            GraphEvent::AddingEdge(e2),
            GraphEvent::AddingEdge(t2),
            GraphEvent::SplittingEdge {
                old: e,
                pos,
                new: (e1, e2),
            },
            GraphEvent::SplittingEdge {
                old: t,
                pos: length - pos,
                new: (t2, t1),
            },
            GraphEvent::DeletingEdge(e),
            GraphEvent::DeletingEdge(t),
        ]);
        m.publish(ticket, &events, &[e, t], &[])?;
        Ok((e1, e2, v_mid))
    }

    /// Glue `remove` onto `keep`, which must join the same vertices, and delete `remove` and
    /// its twin.
    pub fn glue_edges(&self, remove: EdgeId, keep: EdgeId) -> Result<()> {
        let mut m = Mutation::begin(self, "glue_edges")?;
        precondition!(remove != keep, "gluing {remove} onto itself");
        let t_remove = self.conjugate_edge(remove)?;
        let t_keep = self.conjugate_edge(keep)?;
        precondition!(
            t_remove != remove && t_keep != keep,
            "cannot glue self-conjugate edges {remove}, {keep}"
        );
        precondition!(t_remove != keep, "gluing {remove} onto its own twin");
        let (from, to) = self.endpoints(remove)?;
        precondition!(
            self.endpoints(keep)? == (from, to),
            "{remove} and {keep} do not join the same vertices"
        );
        let (twin_from, twin_to) = (self.conjugate_vertex(from)?, self.conjugate_vertex(to)?);

        m.advance(Stage::ReserveIds);
        m.advance(Stage::InstallRecords);
        let locks = vec![from, to, twin_from, twin_to];
        let ticket = self.vertices.with_locked(&locks, |vs| {
            m.advance(Stage::UpdateAdjacency);
            let mut log = AdjacencyLog::default();
            let applied = (|| -> Result<()> {
                m.retire(vs, &[remove, t_remove], &[])?;
                for kept in [keep, t_keep] {
                    if self.edges.is_retiring(kept) {
                        return Err(GraphError::Stale {
                            kind: EdgeId::KIND,
                            id: kept.raw(),
                        });
                    }
                }
                log.remove(vs, from, Side::Out, remove)?;
                log.remove(vs, to, Side::In, remove)?;
                log.remove(vs, twin_to, Side::Out, t_remove)?;
                log.remove(vs, twin_from, Side::In, t_remove)
            })();
            if let Err(err) = applied {
                log.revert(vs);
                m.unretire(vs);
                return Err(err);
            }
            m.advance(Stage::PairConjugates);
            Ok(m.seal())
        })?;

        let events = [
            GraphEvent::GluingEdges {
                e1: remove,
                e2: keep,
                keep,
            },
            GraphEvent::GluingEdges {
                e1: t_remove,
                e2: t_keep,
                keep: t_keep,
            },
            GraphEvent::DeletingEdge(remove),
            GraphEvent::DeletingEdge(t_remove),
        ];
        m.publish(ticket, &events, &[remove, t_remove], &[])
    }

    /// Remove `e` and its twin.
    pub fn delete_edge(&self, e: EdgeId) -> Result<()> {
        let mut m = Mutation::begin(self, "delete_edge")?;
        let t = self.conjugate_edge(e)?;
        let (from, to) = self.endpoints(e)?;
        let (twin_from, twin_to) = (self.conjugate_vertex(from)?, self.conjugate_vertex(to)?);

        let mut events: SmallVec<[GraphEvent; 2]> = smallvec![GraphEvent::DeletingEdge(e)];
        let mut retired: SmallVec<[EdgeId; 2]> = smallvec![e];
        if t != e {
            events.push(GraphEvent::DeletingEdge(t));
            retired.push(t);
        }

        m.advance(Stage::ReserveIds);
        m.advance(Stage::InstallRecords);
        let locks = vec![from, to, twin_from, twin_to];
        let ticket = self.vertices.with_locked(&locks, |vs| {
            m.advance(Stage::UpdateAdjacency);
            let mut log = AdjacencyLog::default();
            let applied = (|| -> Result<()> {
                m.retire(vs, &retired, &[])?;
                log.remove(vs, from, Side::Out, e)?;
                log.remove(vs, to, Side::In, e)?;
                if t != e {
                    log.remove(vs, twin_to, Side::Out, t)?;
                    log.remove(vs, twin_from, Side::In, t)?;
                }
                Ok(())
            })();
            if let Err(err) = applied {
                log.revert(vs);
                m.unretire(vs);
                return Err(err);
            }
            m.advance(Stage::PairConjugates);
            Ok(m.seal())
        })?;
        m.publish(ticket, &events, &retired, &[])
    }

    /// Remove `v` and its twin, which must both be without edges.
    pub fn delete_isolated_vertex(&self, v: VertexId) -> Result<()> {
        let mut m = Mutation::begin(self, "delete_isolated_vertex")?;
        let t = self.conjugate_vertex(v)?;
        let mut events: SmallVec<[GraphEvent; 2]> = smallvec![GraphEvent::DeletingVertex(v)];
        let mut retired: SmallVec<[VertexId; 2]> = smallvec![v];
        if t != v {
            events.push(GraphEvent::DeletingVertex(t));
            retired.push(t);
        }

        m.advance(Stage::ReserveIds);
        m.advance(Stage::InstallRecords);
        let ticket = self.vertices.with_locked(&[v, t], |vs| {
            let degrees = (vs.get(v)?.degree(), vs.get(t)?.degree());
            precondition!(
                degrees == (0, 0),
                "{v} is not isolated: degrees {} and {} (twin {t})",
                degrees.0,
                degrees.1
            );
            m.advance(Stage::UpdateAdjacency);
            m.retire(vs, &[], &retired)?;
            m.advance(Stage::PairConjugates);
            Ok(m.seal())
        })?;
        m.publish(ticket, &events, &[], &retired)
    }
}
