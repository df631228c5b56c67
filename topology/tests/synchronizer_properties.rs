//! Behavioural tests for the topology synchronizer
//!
//! Covers idempotent re-synchronization, zombie exclusion, identity
//! preservation across polls and all-or-nothing visibility for readers.

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use provider_client::{ClientError, MemberDescriptor, NoRecovery, SnapshotSource, ZoneDescriptor};
use sonos_topology::{Device, DeviceId, GroupId, TopologySynchronizer};

// ============================================================================
// Test Helpers
// ============================================================================

struct EmptySource;

impl SnapshotSource for EmptySource {
    fn zones(&self) -> Result<Vec<ZoneDescriptor>, ClientError> {
        Ok(Vec::new())
    }
}

fn synchronizer() -> TopologySynchronizer {
    TopologySynchronizer::new(Arc::new(EmptySource), Arc::new(NoRecovery), Duration::ZERO)
}

fn member(uuid: &str, room: &str) -> MemberDescriptor {
    MemberDescriptor {
        uuid: Some(uuid.to_string()),
        room_name: Some(room.to_string()),
        ..Default::default()
    }
}

fn offline(uuid: &str, room: &str) -> MemberDescriptor {
    MemberDescriptor {
        online: Some(false),
        ..member(uuid, room)
    }
}

fn zone(id: &str, coordinator: MemberDescriptor, members: Vec<MemberDescriptor>) -> ZoneDescriptor {
    ZoneDescriptor {
        uuid: Some(id.to_string()),
        coordinator: Some(coordinator),
        members,
    }
}

/// Device content without the poll timestamp
fn content(device: &Device) -> Device {
    Device {
        last_seen: None,
        ..device.clone()
    }
}

/// Strategy for one zone: per-member online flags and whether the
/// coordinator is repeated in the member list
fn zone_strategy() -> impl Strategy<Value = (Vec<bool>, bool)> {
    (prop::collection::vec(any::<bool>(), 0..4), any::<bool>())
}

fn snapshot_strategy() -> impl Strategy<Value = Vec<ZoneDescriptor>> {
    prop::collection::vec(zone_strategy(), 0..6).prop_map(|zones| {
        zones
            .into_iter()
            .enumerate()
            .map(|(z, (online, repeat))| {
                let coordinator = member(&format!("D{}_0", z), &format!("Room {}", z));
                let mut members = Vec::new();
                if repeat {
                    members.push(coordinator.clone());
                }
                for (m, is_online) in online.into_iter().enumerate() {
                    let uuid = format!("D{}_{}", z, m + 1);
                    let room = format!("Room {}.{}", z, m + 1);
                    members.push(if is_online { member(&uuid, &room) } else { offline(&uuid, &room) });
                }
                zone(&format!("Z{}", z), coordinator, members)
            })
            .collect()
    })
}

/// Every device's group membership points at a group listing it exactly once
fn assert_membership_consistent(sync: &TopologySynchronizer) {
    let snapshot = sync.snapshot();
    for device in &snapshot.devices {
        if let Some(group_id) = &device.group_id {
            let group = snapshot
                .groups
                .iter()
                .find(|g| g.id() == group_id)
                .unwrap_or_else(|| panic!("{} references missing group {}", device.id, group_id));
            let occurrences = group.members().iter().filter(|m| m.id == device.id).count();
            assert_eq!(occurrences, 1, "{} appears {} times in {}", device.id, occurrences, group_id);
        }
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Applying the same snapshot twice yields the same content and the same
    /// group instances
    #[test]
    fn prop_resync_is_idempotent(zones in snapshot_strategy()) {
        let sync = synchronizer();

        let first_report = sync.apply_snapshot(&zones);
        let first_devices: Vec<Device> = sync.devices().iter().map(content).collect();
        let first_groups = sync.groups();

        let second_report = sync.apply_snapshot(&zones);
        let second_devices: Vec<Device> = sync.devices().iter().map(content).collect();
        let second_groups = sync.groups();

        prop_assert_eq!(first_report, second_report);
        prop_assert_eq!(first_devices, second_devices);
        prop_assert_eq!(first_groups.len(), second_groups.len());
        for (a, b) in first_groups.iter().zip(second_groups.iter()) {
            prop_assert_eq!(a.id(), b.id());
            prop_assert_eq!(a.member_ids(), b.member_ids());
            prop_assert!(a.same_instance(b));
        }
    }

    /// Only groups passing the validity predicate are ever visible
    #[test]
    fn prop_visible_groups_are_valid(zones in snapshot_strategy()) {
        let sync = synchronizer();
        let report = sync.apply_snapshot(&zones);

        let groups = sync.groups();
        prop_assert_eq!(groups.len(), report.groups);
        for group in &groups {
            prop_assert!(group.is_valid());
            prop_assert!(group.members().iter().all(|m| m.online));
            let distinct: HashSet<&DeviceId> = group.members().iter().map(|m| &m.id).collect();
            prop_assert_eq!(distinct.len(), group.member_count());
        }
        assert_membership_consistent(&sync);
    }

    /// A zone whose members are all the coordinator never becomes a group
    #[test]
    fn prop_coordinator_only_zone_is_standalone(repeats in 0usize..4) {
        let sync = synchronizer();
        let members = vec![member("D1", "Living"); repeats];
        sync.apply_snapshot(&[zone("Z1", member("D1", "Living"), members)]);

        prop_assert!(sync.groups().is_empty());
        let device = sync.device(&DeviceId::new("D1")).unwrap();
        prop_assert!(device.group_id.is_none());
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_two_device_group_scenario() {
    let sync = synchronizer();
    sync.apply_snapshot(&[zone(
        "Z1",
        member("D1", "Living"),
        vec![member("D1", "Living"), member("D2", "Kitchen")],
    )]);

    let groups = sync.groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].id().as_str(), "Z1");
    assert_eq!(groups[0].member_ids(), vec![DeviceId::new("D1"), DeviceId::new("D2")]);

    let devices = sync.devices();
    assert_eq!(devices.len(), 2);
    let d1 = sync.device(&DeviceId::new("D1")).unwrap();
    assert_eq!(d1.group_id, Some(GroupId::new("Z1")));
}

#[test]
fn test_group_shrinks_to_coordinator_scenario() {
    let sync = synchronizer();
    sync.apply_snapshot(&[zone(
        "Z1",
        member("D1", "Living"),
        vec![member("D1", "Living"), member("D2", "Kitchen")],
    )]);
    sync.apply_snapshot(&[zone("Z1", member("D1", "Living"), vec![member("D1", "Living")])]);

    assert!(sync.groups().is_empty());
    assert!(sync.device(&DeviceId::new("D2")).is_none());
    assert!(sync.device(&DeviceId::new("D1")).unwrap().group_id.is_none());
}

#[test]
fn test_offline_member_invalidates_group() {
    let sync = synchronizer();
    sync.apply_snapshot(&[zone("Z1", member("D1", "Living"), vec![member("D2", "Kitchen")])]);
    assert!(sync.group(&GroupId::new("Z1")).is_some());

    sync.apply_snapshot(&[zone(
        "Z1",
        member("D1", "Living"),
        vec![member("D2", "Kitchen"), offline("D3", "Office")],
    )]);

    assert!(sync.group(&GroupId::new("Z1")).is_none());
    assert!(sync.groups().is_empty());
    assert_membership_consistent(&sync);
}

#[test]
fn test_identity_preserved_across_coordinator_handoff() {
    let sync = synchronizer();
    sync.apply_snapshot(&[zone("Z1", member("D1", "Living"), vec![member("D2", "Kitchen")])]);
    let before = sync.group(&GroupId::new("Z1")).unwrap();

    sync.apply_snapshot(&[zone(
        "Z1",
        member("D2", "Kitchen"),
        vec![member("D1", "Living"), member("D3", "Office")],
    )]);
    let after = sync.group(&GroupId::new("Z1")).unwrap();

    assert!(after.same_instance(&before));
    assert_eq!(after.formed_at(), before.formed_at());
    assert_eq!(after.coordinator().id.as_str(), "D2");
    assert_eq!(
        after.member_ids(),
        vec![DeviceId::new("D2"), DeviceId::new("D1"), DeviceId::new("D3")]
    );
    assert_eq!(sync.device(&DeviceId::new("D1")).unwrap().coordinator_id, Some(DeviceId::new("D2")));
}

#[test]
fn test_zombie_interval_starts_a_new_instance() {
    let sync = synchronizer();
    let grouped = [zone("Z1", member("D1", "Living"), vec![member("D2", "Kitchen")])];

    sync.apply_snapshot(&grouped);
    let first = sync.group(&GroupId::new("Z1")).unwrap();

    sync.apply_snapshot(&[zone("Z1", member("D1", "Living"), vec![offline("D2", "Kitchen")])]);
    sync.apply_snapshot(&grouped);
    let second = sync.group(&GroupId::new("Z1")).unwrap();

    assert!(!second.same_instance(&first));
}

#[test]
fn test_disappeared_zone_is_removed() {
    let sync = synchronizer();
    sync.apply_snapshot(&[
        zone("Z1", member("D1", "Living"), vec![member("D2", "Kitchen")]),
        zone("Z2", member("D3", "Office"), vec![member("D4", "Study")]),
    ]);
    assert_eq!(sync.groups().len(), 2);

    sync.apply_snapshot(&[zone("Z2", member("D3", "Office"), vec![member("D4", "Study")])]);

    assert!(sync.group(&GroupId::new("Z1")).is_none());
    assert!(sync.device(&DeviceId::new("D1")).is_none());
    assert!(sync.group(&GroupId::new("Z2")).is_some());
}

#[test]
fn test_readers_never_see_mixed_snapshots() {
    fn generation(prefix: &str) -> Vec<ZoneDescriptor> {
        (0..8)
            .map(|i| {
                let coordinator = member(&format!("{}{}", prefix, i), &format!("{} room {}", prefix, i));
                let partner = member(&format!("{}{}p", prefix, i), &format!("{} partner {}", prefix, i));
                zone(&format!("{}Z{}", prefix, i), coordinator, vec![partner])
            })
            .collect()
    }

    let sync = Arc::new(synchronizer());
    let a = generation("A");
    let b = generation("B");
    sync.apply_snapshot(&a);

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let sync = Arc::clone(&sync);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    let devices = sync.devices();
                    assert_eq!(devices.len(), 16);
                    let prefixes: HashSet<char> =
                        devices.iter().filter_map(|d| d.id.as_str().chars().next()).collect();
                    assert_eq!(prefixes.len(), 1, "mixed generations: {:?}", prefixes);

                    let snapshot = sync.snapshot();
                    let ids: HashSet<&DeviceId> = snapshot.devices.iter().map(|d| &d.id).collect();
                    for group in &snapshot.groups {
                        assert!(group.members().iter().all(|m| ids.contains(&m.id)));
                    }
                }
            })
        })
        .collect();

    for i in 0..200 {
        sync.apply_snapshot(if i % 2 == 0 { &b } else { &a });
    }
    done.store(true, Ordering::Relaxed);

    for reader in readers {
        reader.join().unwrap();
    }
}

/// First fetch is slow and returns the older household, later fetches return
/// the newer one
struct SlowFirstSource {
    calls: std::sync::atomic::AtomicUsize,
    fetching: std::sync::mpsc::SyncSender<()>,
}

impl SnapshotSource for SlowFirstSource {
    fn zones(&self) -> Result<Vec<ZoneDescriptor>, ClientError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            let _ = self.fetching.send(());
            thread::sleep(Duration::from_millis(200));
            Ok(vec![zone("Z1", member("D1", "Living Room"), vec![member("D2", "Kitchen")])])
        } else {
            Ok(vec![
                zone("Z1", member("D1", "Living Room"), vec![]),
                zone("Z2", member("D2", "Kitchen"), vec![]),
            ])
        }
    }
}

#[test]
fn test_overlapping_passes_apply_in_fetch_order() {
    let (tx, rx) = std::sync::mpsc::sync_channel(1);
    let source = SlowFirstSource {
        calls: std::sync::atomic::AtomicUsize::new(0),
        fetching: tx,
    };
    let sync = Arc::new(TopologySynchronizer::new(Arc::new(source), Arc::new(NoRecovery), Duration::ZERO));

    let older = {
        let sync = Arc::clone(&sync);
        thread::spawn(move || sync.synchronize())
    };
    rx.recv().unwrap();

    let report = sync.synchronize().unwrap();
    assert_eq!(report.groups, 0);
    older.join().unwrap().unwrap();

    assert!(sync.groups().is_empty(), "older snapshot overwrote the newer model");
    assert_eq!(sync.device(&DeviceId::new("D2")).unwrap().group_id, None);
}

#[test]
fn test_mistyped_member_state_keeps_the_group() {
    let zone = ZoneDescriptor::from_value_lossy(serde_json::json!({
        "uuid": "Z1",
        "coordinator": { "uuid": "D1", "roomName": "Living Room" },
        "members": [
            { "uuid": "D1", "roomName": "Living Room" },
            { "uuid": "D2", "roomName": "Kitchen" },
            { "uuid": "D3", "roomName": "Office", "state": { "mute": "no" } }
        ]
    }));

    let sync = synchronizer();
    let report = sync.apply_snapshot(&[zone]);

    assert_eq!(report.dropped_zones, 0);
    assert_eq!(report.groups, 1);
    let group = sync.group(&GroupId::new("Z1")).unwrap();
    assert_eq!(group.members().len(), 3);
    assert_eq!(sync.device(&DeviceId::new("D3")).unwrap().group_id, Some(GroupId::new("Z1")));
}
