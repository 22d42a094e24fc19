//! Notification recipient resolution.
//!
//! Pure function over the ticket's party ids: creator, requester and
//! assignee minus the acting user, deduplicated. Both the in-app
//! notification fan-out and the mail fan-out use this.

/// The party ids a ticket carries. Derived foreign keys, populated at write
/// time, never computed from a loaded relation graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct TicketParties {
    pub creator_id: i32,
    pub usuario_solicitante_id: Option<i32>,
    pub assigned_to_id: Option<i32>,
}

/// Deduplicated, actor-excluded recipient set.
///
/// Order follows the party declaration order (creator, requester,
/// assignee), so output is stable for a given ticket.
pub fn resolve_recipients(parties: &TicketParties, actor_id: i32) -> Vec<i32> {
    let mut out = Vec::with_capacity(3);
    for id in [
        Some(parties.creator_id),
        parties.usuario_solicitante_id,
        parties.assigned_to_id,
    ]
    .into_iter()
    .flatten()
    {
        if id != actor_id && !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parties(creator: i32, requester: Option<i32>, assignee: Option<i32>) -> TicketParties {
        TicketParties {
            creator_id: creator,
            usuario_solicitante_id: requester,
            assigned_to_id: assignee,
        }
    }

    #[test]
    fn excludes_the_actor() {
        let p = parties(1, Some(2), Some(3));
        assert_eq!(resolve_recipients(&p, 1), vec![2, 3]);
        assert_eq!(resolve_recipients(&p, 2), vec![1, 3]);
        assert_eq!(resolve_recipients(&p, 3), vec![1, 2]);
    }

    #[test]
    fn deduplicates_overlapping_parties() {
        let p = parties(1, Some(1), Some(2));
        assert_eq!(resolve_recipients(&p, 99), vec![1, 2]);

        let p = parties(5, Some(5), Some(5));
        assert_eq!(resolve_recipients(&p, 99), vec![5]);
    }

    #[test]
    fn actor_not_a_party_gets_everyone() {
        let p = parties(1, Some(2), None);
        assert_eq!(resolve_recipients(&p, 42), vec![1, 2]);
    }

    #[test]
    fn empty_when_actor_is_the_only_party() {
        let p = parties(7, None, None);
        assert!(resolve_recipients(&p, 7).is_empty());

        let p = parties(7, Some(7), Some(7));
        assert!(resolve_recipients(&p, 7).is_empty());
    }

    #[test]
    fn never_contains_duplicates_or_actor_exhaustive() {
        // Small exhaustive sweep over party/actor combinations.
        let ids = [1, 2, 3];
        for c in ids {
            for r in [None, Some(1), Some(2), Some(3)] {
                for a in [None, Some(1), Some(2), Some(3)] {
                    for actor in [1, 2, 3, 4] {
                        let out = resolve_recipients(&parties(c, r, a), actor);
                        assert!(!out.contains(&actor));
                        let mut sorted = out.clone();
                        sorted.sort_unstable();
                        sorted.dedup();
                        assert_eq!(sorted.len(), out.len(), "duplicates in {out:?}");
                    }
                }
            }
        }
    }
}
