//! Implements an in-process [`Communicator`], where each rank is a thread.
//!
//! This is primarily useful for tests and for simulating a distributed run
//! inside of a single process. Every collective is built on top of a single
//! rendezvous primitive (`exchange`): each rank deposits a contribution, the
//! last rank to arrive publishes the full set of contributions, and then
//! each rank assembles its own result from that set. Because every rank sees
//! the same contributions and combines them in rank order, reductions are
//! bitwise identical across ranks.
//!
//! A rendezvous round is identified by a generation counter. A rank that
//! races ahead to the next collective waits until every rank has collected
//! the results of the current round.

use crate::Error;
use crate::comm::{Communicator, ReduceOp};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Identifies the collective that a rank is participating in. Ranks that
/// disagree about this value have issued mismatched collectives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CollectiveKind {
    Barrier,
    AllreduceF64(ReduceOp),
    AllreduceU64(ReduceOp),
    AllgatherF64,
    AllgatherU64,
    AllgathervF64,
    BcastF64 { root: usize },
    SendRecvF64,
}

#[derive(Clone, Debug)]
enum Payload {
    Empty,
    F64(Vec<f64>),
    U64(Vec<u64>),
}

#[derive(Clone, Debug)]
struct Deposit {
    kind: CollectiveKind,
    payload: Payload,
    // only used by sendrecv
    dest: Option<usize>,
}

impl Deposit {
    fn new(kind: CollectiveKind, payload: Payload) -> Self {
        Deposit {
            kind,
            payload,
            dest: None,
        }
    }
}

struct RoundState {
    generation: u64,
    deposits: Vec<Option<Deposit>>,
    n_deposited: usize,
    // Some(..) between the moment the last rank deposits and the moment the
    // last rank collects
    results: Option<Arc<Vec<Deposit>>>,
    n_collected: usize,
}

struct SharedGroup {
    world: usize,
    state: Mutex<RoundState>,
    cond: Condvar,
    timeout: Option<Duration>,
}

/// A member of an in-process group of ranks.
///
/// Create the whole group at once with [`LocalCommunicator::new_group`] and
/// hand one member to each thread.
pub struct LocalCommunicator {
    rank: usize,
    shared: Arc<SharedGroup>,
}

impl LocalCommunicator {
    /// Creates a group with `world` ranks. Collectives wait indefinitely for
    /// the other ranks.
    pub fn new_group(world: usize) -> Vec<LocalCommunicator> {
        Self::build_group(world, None)
    }

    /// Creates a group with `world` ranks, where a rank gives up on a
    /// collective (and reports an error) if the other ranks don't show up
    /// within `timeout`.
    ///
    /// After a timeout, the group is left in an inconsistent state. It
    /// shouldn't be used for any further collectives.
    pub fn new_group_with_timeout(world: usize, timeout: Duration) -> Vec<LocalCommunicator> {
        Self::build_group(world, Some(timeout))
    }

    fn build_group(world: usize, timeout: Option<Duration>) -> Vec<LocalCommunicator> {
        let shared = Arc::new(SharedGroup {
            world,
            state: Mutex::new(RoundState {
                generation: 0,
                deposits: vec![None; world],
                n_deposited: 0,
                results: None,
                n_collected: 0,
            }),
            cond: Condvar::new(),
            timeout,
        });
        (0..world)
            .map(|rank| LocalCommunicator {
                rank,
                shared: shared.clone(),
            })
            .collect()
    }

    fn err(&self, what: impl Into<String>) -> Error {
        Error::communication(self.rank, what.into())
    }

    fn lock(&self) -> Result<MutexGuard<'_, RoundState>, Error> {
        self.shared
            .state
            .lock()
            .map_err(|_| self.err("another rank panicked during a collective"))
    }

    fn wait<'a>(
        &self,
        guard: MutexGuard<'a, RoundState>,
        deadline: Option<Instant>,
    ) -> Result<MutexGuard<'a, RoundState>, Error> {
        const POISONED: &str = "another rank panicked during a collective";
        match deadline {
            None => self.shared.cond.wait(guard).map_err(|_| self.err(POISONED)),
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(self.err("timed out waiting for the other ranks"));
                }
                let (guard, _) = self
                    .shared
                    .cond
                    .wait_timeout(guard, remaining)
                    .map_err(|_| self.err(POISONED))?;
                Ok(guard)
            }
        }
    }

    /// The rendezvous that every collective is built on.
    ///
    /// Returns the deposits of every rank (indexed by rank). Before
    /// returning, we check that every rank deposited the same kind of
    /// collective.
    fn exchange(&self, deposit: Deposit) -> Result<Arc<Vec<Deposit>>, Error> {
        let world = self.shared.world;
        let kind = deposit.kind;
        let deadline = self.shared.timeout.map(|t| Instant::now() + t);

        let mut state = self.lock()?;

        // the results of the previous round are still being collected
        while state.results.is_some() {
            state = self.wait(state, deadline)?;
        }

        let generation = state.generation;
        if state.deposits[self.rank].is_some() {
            return Err(self.err("this rank already has a pending contribution"));
        }
        state.deposits[self.rank] = Some(deposit);
        state.n_deposited += 1;

        if state.n_deposited == world {
            let deposits: Option<Vec<Deposit>> =
                state.deposits.iter_mut().map(|d| d.take()).collect();
            let deposits = deposits.ok_or_else(|| self.err("a contribution went missing"))?;
            state.results = Some(Arc::new(deposits));
            state.n_deposited = 0;
            self.shared.cond.notify_all();
        } else {
            while state.generation == generation && state.results.is_none() {
                state = self.wait(state, deadline)?;
            }
        }

        let results = state
            .results
            .clone()
            .ok_or_else(|| self.err("the results of the collective went missing"))?;
        state.n_collected += 1;
        if state.n_collected == world {
            state.results = None;
            state.n_collected = 0;
            state.generation = state.generation.wrapping_add(1);
            self.shared.cond.notify_all();
        }
        drop(state);

        if let Some((rank, other)) = results
            .iter()
            .enumerate()
            .find(|(_, other)| other.kind != kind)
        {
            return Err(self.err(format!(
                "mismatched collectives: this rank called {kind:?}, rank {rank} called {:?}",
                other.kind
            )));
        }
        Ok(results)
    }

    fn f64_payload<'a>(&self, deposit: &'a Deposit, len: usize) -> Result<&'a [f64], Error> {
        match &deposit.payload {
            Payload::F64(v) if v.len() == len => Ok(v),
            _ => Err(self.err("ranks contributed buffers of inconsistent lengths")),
        }
    }

    fn u64_payload<'a>(&self, deposit: &'a Deposit, len: usize) -> Result<&'a [u64], Error> {
        match &deposit.payload {
            Payload::U64(v) if v.len() == len => Ok(v),
            _ => Err(self.err("ranks contributed buffers of inconsistent lengths")),
        }
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn rank_count(&self) -> usize {
        self.shared.world
    }

    fn barrier(&self) -> Result<(), Error> {
        self.exchange(Deposit::new(CollectiveKind::Barrier, Payload::Empty))?;
        Ok(())
    }

    fn allreduce_f64(&self, buf: &mut [f64], op: ReduceOp) -> Result<(), Error> {
        let results = self.exchange(Deposit::new(
            CollectiveKind::AllreduceF64(op),
            Payload::F64(buf.to_vec()),
        ))?;
        // combine in rank order, starting from rank 0's contribution
        buf.copy_from_slice(self.f64_payload(&results[0], buf.len())?);
        for deposit in results.iter().skip(1) {
            let other = self.f64_payload(deposit, buf.len())?;
            for (acc, v) in buf.iter_mut().zip(other.iter()) {
                op.combine_f64(acc, *v);
            }
        }
        Ok(())
    }

    fn allreduce_u64(&self, buf: &mut [u64], op: ReduceOp) -> Result<(), Error> {
        let results = self.exchange(Deposit::new(
            CollectiveKind::AllreduceU64(op),
            Payload::U64(buf.to_vec()),
        ))?;
        buf.copy_from_slice(self.u64_payload(&results[0], buf.len())?);
        for deposit in results.iter().skip(1) {
            let other = self.u64_payload(deposit, buf.len())?;
            for (acc, v) in buf.iter_mut().zip(other.iter()) {
                op.combine_u64(acc, *v);
            }
        }
        Ok(())
    }

    fn allgather_f64(&self, local: &[f64], out: &mut [f64]) -> Result<(), Error> {
        if out.len() != local.len() * self.shared.world {
            return Err(self.err("allgather output has the wrong length"));
        }
        let results = self.exchange(Deposit::new(
            CollectiveKind::AllgatherF64,
            Payload::F64(local.to_vec()),
        ))?;
        for (deposit, chunk) in results.iter().zip(out.chunks_exact_mut(local.len().max(1))) {
            chunk.copy_from_slice(self.f64_payload(deposit, local.len())?);
        }
        Ok(())
    }

    fn allgather_u64(&self, local: &[u64], out: &mut [u64]) -> Result<(), Error> {
        if out.len() != local.len() * self.shared.world {
            return Err(self.err("allgather output has the wrong length"));
        }
        let results = self.exchange(Deposit::new(
            CollectiveKind::AllgatherU64,
            Payload::U64(local.to_vec()),
        ))?;
        for (deposit, chunk) in results.iter().zip(out.chunks_exact_mut(local.len().max(1))) {
            chunk.copy_from_slice(self.u64_payload(deposit, local.len())?);
        }
        Ok(())
    }

    fn allgatherv_f64(
        &self,
        local: &[f64],
        counts: &[usize],
        out: &mut [f64],
    ) -> Result<(), Error> {
        if counts.len() != self.shared.world || counts[self.rank] != local.len() {
            return Err(self.err("allgatherv counts are inconsistent with the local buffer"));
        } else if out.len() != counts.iter().sum::<usize>() {
            return Err(self.err("allgatherv output has the wrong length"));
        }
        let results = self.exchange(Deposit::new(
            CollectiveKind::AllgathervF64,
            Payload::F64(local.to_vec()),
        ))?;
        let mut offset = 0;
        for (deposit, count) in results.iter().zip(counts.iter()) {
            let contribution = self.f64_payload(deposit, *count)?;
            out[offset..offset + count].copy_from_slice(contribution);
            offset += count;
        }
        Ok(())
    }

    fn bcast_f64(&self, buf: &mut [f64], root: usize) -> Result<(), Error> {
        if root >= self.shared.world {
            return Err(self.err(format!("bcast root {root} is not a valid rank")));
        }
        let payload = if self.rank == root {
            Payload::F64(buf.to_vec())
        } else {
            Payload::Empty
        };
        let results = self.exchange(Deposit::new(CollectiveKind::BcastF64 { root }, payload))?;
        buf.copy_from_slice(self.f64_payload(&results[root], buf.len())?);
        Ok(())
    }

    fn sendrecv_replace_f64(
        &self,
        buf: &mut [f64],
        dest: usize,
        source: usize,
    ) -> Result<(), Error> {
        let world = self.shared.world;
        if dest >= world || source >= world {
            return Err(self.err("sendrecv peer is not a valid rank"));
        }
        let deposit = Deposit {
            kind: CollectiveKind::SendRecvF64,
            payload: Payload::F64(buf.to_vec()),
            dest: Some(dest),
        };
        let results = self.exchange(deposit)?;
        let incoming = &results[source];
        if incoming.dest != Some(self.rank) {
            return Err(self.err(format!(
                "expected a message from rank {source}, but it sent to {:?}",
                incoming.dest
            )));
        }
        buf.copy_from_slice(self.f64_payload(incoming, buf.len())?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// run `f` on every member of a fresh group (one thread per rank)
    fn run_group<T: Send>(
        world: usize,
        f: impl Fn(LocalCommunicator) -> T + Sync,
    ) -> Vec<T> {
        let comms = LocalCommunicator::new_group(world);
        thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let f = &f;
                    s.spawn(move || f(comm))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    #[test]
    fn allreduce_in_rank_order() {
        let out = run_group(3, |comm| {
            let r = comm.rank() as f64;
            let mut buf = [r, 10.0 - r, 0.5 * r];
            comm.allreduce_f64(&mut buf, ReduceOp::Sum).unwrap();
            let mut mins = [r + 1.0];
            comm.allreduce_f64(&mut mins, ReduceOp::Min).unwrap();
            let mut maxs = [comm.rank() as u64 * 7];
            comm.allreduce_u64(&mut maxs, ReduceOp::Max).unwrap();
            (buf, mins, maxs)
        });
        for (buf, mins, maxs) in out {
            assert_eq!(buf, [3.0, 27.0, 1.5]);
            assert_eq!(mins, [1.0]);
            assert_eq!(maxs, [14]);
        }
    }

    #[test]
    fn many_rounds_back_to_back() {
        // ranks race ahead into the next round while others are collecting
        let out = run_group(4, |comm| {
            let mut total = 0;
            for i in 0..200_u64 {
                let mut buf = [i + comm.rank() as u64];
                comm.allreduce_u64(&mut buf, ReduceOp::Sum).unwrap();
                total += buf[0];
            }
            total
        });
        // Σᵢ (4i + 6)
        let expected: u64 = (0..200_u64).map(|i| 4 * i + 6).sum();
        assert!(out.iter().all(|t| *t == expected));
    }

    #[test]
    fn gathers() {
        let out = run_group(3, |comm| {
            let r = comm.rank();
            let mut gathered = [0_u64; 6];
            comm.allgather_u64(&[r as u64, 100], &mut gathered).unwrap();

            // rank r contributes r+1 values
            let counts = [1, 2, 3];
            let local = vec![r as f64; r + 1];
            let mut gatheredv = [0.0; 6];
            comm.allgatherv_f64(&local, &counts, &mut gatheredv).unwrap();
            (gathered, gatheredv)
        });
        for (gathered, gatheredv) in out {
            assert_eq!(gathered, [0, 100, 1, 100, 2, 100]);
            assert_eq!(gatheredv, [0.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
        }
    }

    #[test]
    fn bcast_and_ring_shift() {
        let out = run_group(3, |comm| {
            let r = comm.rank();
            let mut buf = [r as f64; 2];
            comm.bcast_f64(&mut buf, 2).unwrap();

            let mut ring = [r as f64];
            let next = (r + 1) % 3;
            let prev = (r + 2) % 3;
            comm.sendrecv_replace_f64(&mut ring, next, prev).unwrap();
            comm.barrier().unwrap();
            (buf, ring[0], prev as f64)
        });
        for (buf, received, prev) in out {
            assert_eq!(buf, [2.0, 2.0]);
            assert_eq!(received, prev);
        }
    }

    #[test]
    fn mismatched_collectives_are_detected() {
        let out = run_group(2, |comm| {
            let mut buf = [1.0];
            if comm.rank() == 0 {
                comm.allreduce_f64(&mut buf, ReduceOp::Sum)
            } else {
                comm.bcast_f64(&mut buf, 0)
            }
        });
        for result in out {
            let err = result.unwrap_err();
            assert!(err.is_communication());
            assert!(err.to_string().contains("mismatched collectives"));
        }
    }

    #[test]
    fn timeout_when_a_rank_never_arrives() {
        let comms = LocalCommunicator::new_group_with_timeout(2, Duration::from_millis(50));
        // only rank 0 participates
        let err = comms[0].barrier().unwrap_err();
        assert!(err.is_communication());
        assert!(err.to_string().contains("timed out"));
    }
}
