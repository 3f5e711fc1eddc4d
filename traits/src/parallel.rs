//! Serialisation vtables and the communicator abstraction used when a
//! distributed tree is configured.
//!
//! Pack and unpack must be symmetric byte streams; reductions must be
//! associative and commutative on their payload so the arrival order of
//! remote contributions is not observable.

/// A growable byte stream with a read cursor. Writers append, readers
/// consume front to back; both sides must agree on the exact sequence of
/// fields.
#[derive(Clone, Debug, Default)]
pub struct PackedMessage {
    buf: Vec<u8>,
    cursor: usize,
}

impl PackedMessage {
    pub fn new() -> PackedMessage {
        PackedMessage::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> PackedMessage {
        PackedMessage {
            buf: bytes,
            cursor: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.cursor = 0;
    }

    /// True once every appended field has been read back.
    pub fn exhausted(&self) -> bool {
        self.cursor == self.buf.len()
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn get_u64(&mut self) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.buf[self.cursor..self.cursor + 8]);
        self.cursor += 8;
        u64::from_le_bytes(raw)
    }

    pub fn put_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn get_f64(&mut self) -> f64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.buf[self.cursor..self.cursor + 8]);
        self.cursor += 8;
        f64::from_le_bytes(raw)
    }

    pub fn put_f64_slice(&mut self, values: &[f64]) {
        for v in values {
            self.put_f64(*v);
        }
    }

    /// Reads exactly `out.len()` doubles. The element count is fixed by the
    /// receiving structure, so no length prefix travels on the wire.
    pub fn get_f64_slice(&mut self, out: &mut [f64]) {
        for v in out.iter_mut() {
            *v = self.get_f64();
        }
    }
}

/// Particle serialisation hooks invoked by the tree: migration between
/// ranks during insertion, the forward visit shipping sources to ranks that
/// need them, and the backward visit returning accumulated contributions.
pub trait ParticleVisitor<P> {
    /// A blank particle remote data will be unpacked into.
    fn alloc(&self) -> P;

    fn destroy(&self, _particle: P) {}

    /// Full state, for migration.
    fn migrate_pack(&self, particle: &P, msg: &mut PackedMessage);

    fn migrate_unpack(&self, particle: &mut P, msg: &mut PackedMessage);

    /// Source side only (position, charge).
    fn visit_fw_pack(&self, particle: &P, msg: &mut PackedMessage);

    fn visit_fw_unpack(&self, particle: &mut P, msg: &mut PackedMessage);

    /// Accumulator side only (field, potential).
    fn visit_bw_pack(&self, particle: &P, msg: &mut PackedMessage);

    fn visit_bw_unpack(&self, particle: &mut P, msg: &mut PackedMessage);

    /// Combines a returned accumulator into the owner's particle. Must be
    /// commutative and associative.
    fn visit_bw_reduce(&self, contribution: &P, into: &mut P);
}

/// Node-data serialisation hooks, mirroring [`ParticleVisitor`]: the forward
/// visit carries multipole expansions outward, the backward visit carries
/// local expansions home.
pub trait NodeDataVisitor<D> {
    fn migrate_pack(&self, data: &D, msg: &mut PackedMessage);

    fn migrate_unpack(&self, data: &mut D, msg: &mut PackedMessage);

    fn visit_fw_pack(&self, data: &D, msg: &mut PackedMessage);

    fn visit_fw_unpack(&self, data: &mut D, msg: &mut PackedMessage);

    fn visit_fw_reduce(&self, contribution: &D, into: &mut D);

    fn visit_bw_pack(&self, data: &D, msg: &mut PackedMessage);

    fn visit_bw_unpack(&self, data: &mut D, msg: &mut PackedMessage);

    fn visit_bw_reduce(&self, contribution: &D, into: &mut D);
}

/// The collective operations the shared-node exchanges need. An MPI binding
/// lives behind the `mpi` feature of the tree crate; [`LocalComm`] serves
/// single-process runs and tests.
pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Gathers every rank's byte buffer on every rank, indexed by rank.
    /// Blocks until all ranks have posted.
    fn all_gather_bytes(&self, local: &[u8]) -> Vec<Vec<u8>>;

    fn barrier(&self) {}
}

/// The trivial single-rank communicator.
#[derive(Copy, Clone, Debug, Default)]
pub struct LocalComm;

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_gather_bytes(&self, local: &[u8]) -> Vec<Vec<u8>> {
        vec![local.to_vec()]
    }
}

/// Bundle handed to the solver to enable the distributed code paths.
pub struct ParallelConfig<C, PV, NV> {
    pub comm: C,
    pub point: PV,
    pub node_data: NV,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_round_trip() {
        let mut msg = PackedMessage::new();
        msg.put_u64(42);
        msg.put_f64(-1.5);
        msg.put_f64_slice(&[1.0, 2.0, 3.0]);

        let mut msg = PackedMessage::from_bytes(msg.into_bytes());
        assert_eq!(msg.get_u64(), 42);
        assert_eq!(msg.get_f64(), -1.5);
        let mut out = [0.0; 3];
        msg.get_f64_slice(&mut out);
        assert_eq!(out, [1.0, 2.0, 3.0]);
        assert!(msg.exhausted());
    }

    #[test]
    fn local_comm_gathers_self() {
        let comm = LocalComm;
        let gathered = comm.all_gather_bytes(&[7, 8, 9]);
        assert_eq!(gathered, vec![vec![7, 8, 9]]);
    }
}
