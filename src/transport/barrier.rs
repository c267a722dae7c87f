use crate::core::{JoinError, NodeId, Result};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Barrier;

/// One-shot all-party rendezvous that also gathers one value per party.
///
/// Every party arrives exactly once. Nobody proceeds until all parties have
/// arrived; each then receives every party's contribution in party order.
/// There is no partial completion: a party that never arrives blocks the
/// others until their timeout expires.
pub struct Rendezvous<T> {
    parties: usize,
    slots: Mutex<Vec<Option<T>>>,
    barrier: Barrier,
}

impl<T: Clone + Send> Rendezvous<T> {
    pub fn new(parties: usize) -> Result<Self> {
        if parties == 0 {
            return Err(JoinError::Config(
                "rendezvous needs at least one party".to_string(),
            ));
        }
        Ok(Self {
            parties,
            slots: Mutex::new(vec![None; parties]),
            barrier: Barrier::new(parties),
        })
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    pub async fn arrive(&self, party: NodeId, contribution: T) -> Result<Vec<T>> {
        {
            let mut slots = self.slots.lock()?;
            let slot = slots.get_mut(party).ok_or_else(|| {
                JoinError::Execution(format!(
                    "party {} out of range for a {}-party rendezvous",
                    party, self.parties
                ))
            })?;
            if slot.is_some() {
                return Err(JoinError::Execution(format!(
                    "party {} arrived at the rendezvous twice",
                    party
                )));
            }
            *slot = Some(contribution);
        }

        self.barrier.wait().await;

        let slots = self.slots.lock()?;
        slots
            .iter()
            .enumerate()
            .map(|(id, slot)| {
                slot.clone().ok_or_else(|| {
                    JoinError::Execution(format!("party {} left no contribution", id))
                })
            })
            .collect()
    }

    /// [`arrive`](Self::arrive) bounded by `timeout`.
    pub async fn arrive_within(
        &self,
        party: NodeId,
        contribution: T,
        timeout: Duration,
    ) -> Result<Vec<T>> {
        match tokio::time::timeout(timeout, self.arrive(party, contribution)).await {
            Ok(result) => result,
            Err(_) => Err(JoinError::Timeout(format!(
                "party {} waited {:?} at the rendezvous",
                party, timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn all_parties_see_every_contribution_in_order() {
        let rendezvous = Arc::new(Rendezvous::new(3).unwrap());
        let handles: Vec<_> = (0..3)
            .rev()
            .map(|party| {
                let rendezvous = rendezvous.clone();
                tokio::spawn(async move { rendezvous.arrive(party, party * 10).await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), vec![0, 10, 20]);
        }
    }

    #[tokio::test]
    async fn missing_party_times_out() {
        let rendezvous = Rendezvous::new(2).unwrap();
        let result = rendezvous
            .arrive_within(0, (), Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(JoinError::Timeout(_))));
    }

    #[tokio::test]
    async fn double_arrival_and_bad_party_are_rejected() {
        let rendezvous = Rendezvous::new(2).unwrap();
        let _ = rendezvous
            .arrive_within(0, 1u8, Duration::from_millis(5))
            .await;
        assert!(matches!(
            rendezvous.arrive(0, 2).await,
            Err(JoinError::Execution(_))
        ));
        assert!(rendezvous.arrive(7, 2).await.is_err());
        assert!(Rendezvous::<u8>::new(0).is_err());
    }
}
