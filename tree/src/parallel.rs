//! MPI binding for the communicator contract.
use mpi::datatype::PartitionMut;
use mpi::traits::*;
use mpi::Count;

use multipole_traits::parallel::Communicator;

/// Wraps an MPI communicator behind the [`Communicator`] contract used by
/// the shared-node exchanges.
pub struct MpiComm<C: mpi::traits::Communicator> {
    comm: C,
}

impl<C: mpi::traits::Communicator> MpiComm<C> {
    pub fn new(comm: C) -> MpiComm<C> {
        MpiComm { comm }
    }
}

impl<C: mpi::traits::Communicator> Communicator for MpiComm<C> {
    fn rank(&self) -> usize {
        self.comm.rank() as usize
    }

    fn size(&self) -> usize {
        self.comm.size() as usize
    }

    fn all_gather_bytes(&self, local: &[u8]) -> Vec<Vec<u8>> {
        let size = self.comm.size() as usize;

        let mut counts = vec![0 as Count; size];
        self.comm
            .all_gather_into(&(local.len() as Count), &mut counts[..]);

        let displs: Vec<Count> = counts
            .iter()
            .scan(0, |acc, &c| {
                let d = *acc;
                *acc += c;
                Some(d)
            })
            .collect();

        let total: Count = counts.iter().sum();
        let mut buffer = vec![0u8; total as usize];
        {
            let mut partition = PartitionMut::new(&mut buffer[..], &counts[..], &displs[..]);
            self.comm.all_gather_varcount_into(local, &mut partition);
        }

        counts
            .iter()
            .zip(displs.iter())
            .map(|(&c, &d)| buffer[d as usize..(d + c) as usize].to_vec())
            .collect()
    }

    fn barrier(&self) {
        self.comm.barrier();
    }
}
