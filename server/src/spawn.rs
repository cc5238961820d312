//! Spawn point registry supplied by the world layer
//!
//! The session coordinator reads each team's spawn list once at start-up.
//! List order is the round-robin order and never changes afterwards.

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Quat, SpawnPoint, Team, Vec3};

/// Read-only source of per-team spawn transforms
pub trait SpawnRegistry {
    /// Ordered spawn points for a team. May be empty.
    fn spawn_points(&self, team: Team) -> Vec<SpawnPoint>;
}

/// Fixed in-memory spawn lists
#[derive(Debug, Clone, Default)]
pub struct StaticSpawnRegistry {
    trappers: Vec<SpawnPoint>,
    natives: Vec<SpawnPoint>,
}

impl StaticSpawnRegistry {
    pub fn new(trappers: Vec<SpawnPoint>, natives: Vec<SpawnPoint>) -> Self {
        Self { trappers, natives }
    }

    /// The graybox river-camp layout
    ///
    /// Trappers start around the skinning area and the moored keelboats.
    /// Natives are scattered along the treeline north of camp; `seed` makes
    /// that scatter reproducible.
    pub fn graybox(seed: u64) -> Self {
        const TREELINE_Z: f32 = 50.0;
        const NATIVE_SPAWNS: usize = 12;

        let trappers = vec![
            SpawnPoint::new("Spawn_Trapper_SkinningArea", Vec3::new(0.0, 0.0, -15.0)),
            SpawnPoint::new("Spawn_Trapper_ByBoat1", Vec3::new(-25.0, 0.0, -35.0)),
            SpawnPoint::new("Spawn_Trapper_ByBoat2", Vec3::new(25.0, 0.0, -35.0)),
            SpawnPoint::new("Spawn_Trapper_ByCrates", Vec3::new(-10.0, 0.0, -30.0)),
        ];

        let mut rng = StdRng::seed_from_u64(seed);
        let natives = (0..NATIVE_SPAWNS)
            .map(|i| {
                let x = rng.gen_range(-100.0..100.0);
                let z = TREELINE_Z + rng.gen_range(5.0..30.0);
                // Face south, toward the camp
                SpawnPoint::new(format!("Spawn_Native_{:02}", i + 1), Vec3::new(x, 0.0, z))
                    .with_orientation(Quat::from_yaw_degrees(180.0))
            })
            .collect::<Vec<_>>();

        info!(
            "Graybox layout: {} trapper, {} native spawns (seed {})",
            trappers.len(),
            natives.len(),
            seed
        );
        Self::new(trappers, natives)
    }
}

impl SpawnRegistry for StaticSpawnRegistry {
    fn spawn_points(&self, team: Team) -> Vec<SpawnPoint> {
        match team {
            Team::Trapper => self.trappers.clone(),
            Team::Native => self.natives.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_registry_per_team() {
        let registry = StaticSpawnRegistry::new(
            vec![SpawnPoint::new("a", Vec3::ZERO)],
            vec![
                SpawnPoint::new("b", Vec3::new(1.0, 0.0, 0.0)),
                SpawnPoint::new("c", Vec3::new(2.0, 0.0, 0.0)),
            ],
        );

        assert_eq!(registry.spawn_points(Team::Trapper).len(), 1);
        let natives = registry.spawn_points(Team::Native);
        assert_eq!(natives.len(), 2);
        assert_eq!(natives[0].name, "b");
        assert_eq!(natives[1].name, "c");
    }

    #[test]
    fn test_empty_registry() {
        let registry = StaticSpawnRegistry::default();
        assert!(registry.spawn_points(Team::Trapper).is_empty());
        assert!(registry.spawn_points(Team::Native).is_empty());
    }

    #[test]
    fn test_graybox_layout() {
        let registry = StaticSpawnRegistry::graybox(1620);

        let trappers = registry.spawn_points(Team::Trapper);
        assert_eq!(trappers.len(), 4);
        assert_eq!(trappers[0].name, "Spawn_Trapper_SkinningArea");
        assert_eq!(trappers[0].position, Vec3::new(0.0, 0.0, -15.0));

        let natives = registry.spawn_points(Team::Native);
        assert_eq!(natives.len(), 12);
        assert_eq!(natives[0].name, "Spawn_Native_01");
        assert_eq!(natives[11].name, "Spawn_Native_12");
        for spawn in &natives {
            assert!((-100.0..=100.0).contains(&spawn.position.x));
            assert!((55.0..=80.0).contains(&spawn.position.z));
            assert_eq!(spawn.position.y, 0.0);
        }
    }

    #[test]
    fn test_graybox_seed_is_reproducible() {
        let a = StaticSpawnRegistry::graybox(7).spawn_points(Team::Native);
        let b = StaticSpawnRegistry::graybox(7).spawn_points(Team::Native);
        let c = StaticSpawnRegistry::graybox(8).spawn_points(Team::Native);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
