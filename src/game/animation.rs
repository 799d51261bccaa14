//! Walk-cycle animation for local fighters and frame holds for remote ones

use tracing::debug;

use crate::ws::protocol::{AnimationKind, PositionUpdate};

use super::state::PLAYER_COUNT;
use super::Scene;

/// Time between walk frames (ms)
pub const WALK_FRAME_INTERVAL_MS: u64 = 250;

/// How long a peer-reported frame stays pinned (ms)
pub const FRAME_HOLD_MS: u64 = 300;

pub const IDLE_FRAME: u8 = 0;
pub const FIRST_WALK_FRAME: u8 = 1;
pub const SECOND_WALK_FRAME: u8 = 2;

/// Two-frame walk cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkCycle {
    frame: u8,
    last_step_at: u64,
    running: bool,
}

impl WalkCycle {
    pub fn frame(&self) -> u8 {
        self.frame
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Step the cycle; returns the new frame when it changed
    pub fn advance(&mut self, moving: bool, now: u64) -> Option<u8> {
        if !moving {
            if !self.running && self.frame == IDLE_FRAME {
                return None;
            }
            self.running = false;
            self.frame = IDLE_FRAME;
            return Some(IDLE_FRAME);
        }

        if !self.running {
            self.running = true;
            self.frame = FIRST_WALK_FRAME;
            self.last_step_at = now;
            return Some(FIRST_WALK_FRAME);
        }

        if now.saturating_sub(self.last_step_at) < WALK_FRAME_INTERVAL_MS {
            return None;
        }
        self.frame = if self.frame == FIRST_WALK_FRAME {
            SECOND_WALK_FRAME
        } else {
            FIRST_WALK_FRAME
        };
        self.last_step_at = now;
        Some(self.frame)
    }
}

/// A peer-reported frame pinned on a remote sprite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteFrameHold {
    pub frame: u8,
    pub timestamp: u64,
    pub hold_duration: u64,
}

impl RemoteFrameHold {
    pub fn new(frame: u8, now: u64) -> Self {
        Self {
            frame,
            timestamp: now,
            hold_duration: FRAME_HOLD_MS,
        }
    }

    pub fn is_active(&self, now: u64) -> bool {
        now.saturating_sub(self.timestamp) < self.hold_duration
    }
}

/// Which clock drives a sprite's frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpriteAnimation {
    /// Driven by local input
    Local(WalkCycle),
    /// Pinned to the last frame the peer sent
    RemoteHeld(RemoteFrameHold),
    /// Hold expired; animating on our own until the next update
    SharedFallback(WalkCycle),
}

impl Default for SpriteAnimation {
    fn default() -> Self {
        Self::Local(WalkCycle::default())
    }
}

impl SpriteAnimation {
    pub fn hold(&self) -> Option<&RemoteFrameHold> {
        match self {
            Self::RemoteHeld(hold) => Some(hold),
            _ => None,
        }
    }
}

/// Keeps local prediction and peer-reported frames consistent
#[derive(Debug, Clone, Copy, Default)]
pub struct AnimationFrameSynchronizer;

impl AnimationFrameSynchronizer {
    pub fn new() -> Self {
        Self
    }

    /// Advance a locally-driven fighter's walk cycle. Frame changes are sent
    /// to the peer when online. Returns the new frame if it changed.
    pub fn update_walking_animation(
        &self,
        scene: &mut Scene<'_>,
        player: usize,
        now: u64,
    ) -> Option<u8> {
        let fighter = scene.fighters.get_mut(player)?;

        if !matches!(fighter.animation, SpriteAnimation::Local(_)) {
            fighter.animation = SpriteAnimation::default();
        }
        let SpriteAnimation::Local(cycle) = &mut fighter.animation else {
            return None;
        };

        let moving = fighter.velocity_x != 0.0;
        let frame = cycle.advance(moving, now)?;
        fighter.frame = frame;

        if scene.state.should_broadcast(player) {
            let animation = if frame == IDLE_FRAME {
                AnimationKind::Idle
            } else {
                AnimationKind::Walking
            };
            let update = PositionUpdate {
                player_index: player,
                x: fighter.x,
                y: fighter.y,
                velocity_x: fighter.velocity_x,
                velocity_y: fighter.velocity_y,
                flip_x: fighter.flip_x,
                frame: Some(frame),
                animation: Some(animation),
                cause: None,
                timestamp: 0,
            };
            scene.transport.send_position_update(update);
        }

        Some(frame)
    }

    /// Advance a remote fighter: keep the held frame while the hold lasts,
    /// then animate on the shared cycle. Returns the current frame.
    pub fn update_shared_walking_animation(
        &self,
        scene: &mut Scene<'_>,
        player: usize,
        now: u64,
    ) -> Option<u8> {
        let fighter = scene.fighters.get_mut(player)?;

        match fighter.animation {
            SpriteAnimation::RemoteHeld(hold) if hold.is_active(now) => {
                fighter.frame = hold.frame;
                return Some(hold.frame);
            }
            SpriteAnimation::RemoteHeld(_) | SpriteAnimation::Local(_) => {
                debug!(player, "Frame hold over, using shared walk cycle");
                fighter.animation = SpriteAnimation::SharedFallback(WalkCycle::default());
            }
            SpriteAnimation::SharedFallback(_) => {}
        }

        let moving = match fighter.remote_animation {
            Some(kind) => kind == AnimationKind::Walking,
            None => fighter.velocity_x != 0.0,
        };
        if let SpriteAnimation::SharedFallback(cycle) = &mut fighter.animation {
            if let Some(frame) = cycle.advance(moving, now) {
                fighter.frame = frame;
            }
        }
        if !moving {
            fighter.frame = IDLE_FRAME;
        }
        Some(fighter.frame)
    }

    /// Ingest a peer's `position_update`: move the sprite, show the frame
    /// and hold it. Updates about the local fighter are ignored.
    pub fn handle_remote_action(
        &self,
        scene: &mut Scene<'_>,
        update: &PositionUpdate,
        now: u64,
    ) -> bool {
        let player = update.player_index;
        if player >= PLAYER_COUNT || player == scene.state.local_player_index {
            debug!(player, "Position update for local or invalid slot, ignoring");
            return false;
        }
        let Some(fighter) = scene.fighters.get_mut(player) else {
            return false;
        };

        fighter.x = update.x;
        fighter.y = update.y;
        fighter.velocity_x = update.velocity_x;
        fighter.velocity_y = update.velocity_y;
        fighter.flip_x = update.flip_x;

        let animation = update.resolved_animation();
        if animation.is_some() {
            fighter.remote_animation = animation;
        }

        // Without a frame, idle means frame 0 and anything else keeps the shown frame
        let frame = update.frame.unwrap_or(if animation == Some(AnimationKind::Idle) {
            IDLE_FRAME
        } else {
            fighter.frame
        });
        fighter.frame = frame;
        fighter.animation = SpriteAnimation::RemoteHeld(RemoteFrameHold::new(frame, now));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::testing::Fixture;
    use crate::ws::protocol::NetworkMessage;

    fn position(player_index: usize, frame: u8, velocity_x: f32) -> PositionUpdate {
        PositionUpdate {
            player_index,
            x: 420.0,
            y: 300.0,
            velocity_x,
            velocity_y: 0.0,
            flip_x: true,
            frame: Some(frame),
            animation: Some(if velocity_x == 0.0 {
                AnimationKind::Idle
            } else {
                AnimationKind::Walking
            }),
            cause: None,
            timestamp: 0,
        }
    }

    #[test]
    fn local_walk_toggles_every_interval() {
        let mut fixture = Fixture::local();
        let sync = AnimationFrameSynchronizer::new();
        fixture.fighters[0].velocity_x = 160.0;

        let frames: Vec<Option<u8>> = [0, 100, 250, 400, 500]
            .into_iter()
            .map(|now| sync.update_walking_animation(&mut fixture.scene(), 0, now))
            .collect();
        assert_eq!(frames, vec![Some(1), None, Some(2), None, Some(1)]);

        fixture.fighters[0].velocity_x = 0.0;
        assert_eq!(sync.update_walking_animation(&mut fixture.scene(), 0, 520), Some(0));
        assert_eq!(sync.update_walking_animation(&mut fixture.scene(), 0, 800), None);
        assert_eq!(fixture.fighters[0].frame, IDLE_FRAME);
    }

    #[test]
    fn local_frame_changes_are_sent_online() {
        let mut fixture = Fixture::online(0);
        let sync = AnimationFrameSynchronizer::new();
        fixture.fighters[0].velocity_x = -160.0;

        sync.update_walking_animation(&mut fixture.scene(), 0, 0);
        sync.update_walking_animation(&mut fixture.scene(), 0, 250);
        fixture.fighters[0].velocity_x = 0.0;
        sync.update_walking_animation(&mut fixture.scene(), 0, 300);

        let frames: Vec<(Option<u8>, Option<AnimationKind>)> = fixture
            .sent()
            .into_iter()
            .map(|m| match m {
                NetworkMessage::PositionUpdate(u) => (u.frame, u.animation),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            frames,
            vec![
                (Some(1), Some(AnimationKind::Walking)),
                (Some(2), Some(AnimationKind::Walking)),
                (Some(0), Some(AnimationKind::Idle)),
            ]
        );
    }

    #[test]
    fn remote_player_walk_is_not_sent() {
        let mut fixture = Fixture::online(0);
        let sync = AnimationFrameSynchronizer::new();
        fixture.fighters[1].velocity_x = 160.0;

        sync.update_walking_animation(&mut fixture.scene(), 1, 0);

        assert!(fixture.sent().is_empty());
    }

    #[test]
    fn remote_frame_is_held_then_falls_back() {
        let mut fixture = Fixture::online(0);
        let sync = AnimationFrameSynchronizer::new();

        assert!(sync.handle_remote_action(&mut fixture.scene(), &position(1, 2, 160.0), 1_000));
        let fighter = &fixture.fighters[1];
        assert_eq!(fighter.frame, 2);
        assert_eq!(fighter.x, 420.0);
        assert!(fighter.flip_x);
        assert_eq!(
            fighter.animation.hold(),
            Some(&RemoteFrameHold {
                frame: 2,
                timestamp: 1_000,
                hold_duration: FRAME_HOLD_MS
            })
        );

        // The renderer may have moved the frame; the hold puts it back
        fixture.fighters[1].frame = 0;
        assert_eq!(sync.update_shared_walking_animation(&mut fixture.scene(), 1, 1_299), Some(2));

        // Hold expires at exactly 300ms and the shared cycle restarts at 1
        assert_eq!(sync.update_shared_walking_animation(&mut fixture.scene(), 1, 1_300), Some(1));
        assert!(fixture.fighters[1].animation.hold().is_none());
        assert!(matches!(
            fixture.fighters[1].animation,
            SpriteAnimation::SharedFallback(_)
        ));

        assert_eq!(sync.update_shared_walking_animation(&mut fixture.scene(), 1, 1_550), Some(2));
        assert_eq!(sync.update_shared_walking_animation(&mut fixture.scene(), 1, 1_800), Some(1));
    }

    #[test]
    fn new_update_reestablishes_hold() {
        let mut fixture = Fixture::online(0);
        let sync = AnimationFrameSynchronizer::new();

        sync.handle_remote_action(&mut fixture.scene(), &position(1, 2, 160.0), 0);
        sync.update_shared_walking_animation(&mut fixture.scene(), 1, 400);
        sync.handle_remote_action(&mut fixture.scene(), &position(1, 1, 160.0), 500);

        assert_eq!(sync.update_shared_walking_animation(&mut fixture.scene(), 1, 790), Some(1));
        assert_eq!(
            fixture.fighters[1].animation.hold().map(|h| h.timestamp),
            Some(500)
        );
    }

    #[test]
    fn idle_remote_falls_back_to_idle_frame() {
        let mut fixture = Fixture::online(0);
        let sync = AnimationFrameSynchronizer::new();

        sync.handle_remote_action(&mut fixture.scene(), &position(1, 0, 0.0), 0);
        assert_eq!(sync.update_shared_walking_animation(&mut fixture.scene(), 1, 300), Some(0));
    }

    #[test]
    fn local_fighter_never_holds() {
        let mut fixture = Fixture::online(0);
        let sync = AnimationFrameSynchronizer::new();

        assert!(!sync.handle_remote_action(&mut fixture.scene(), &position(0, 2, 160.0), 0));
        assert!(matches!(fixture.fighters[0].animation, SpriteAnimation::Local(_)));
        assert_eq!(fixture.fighters[0].x, 100.0);
    }

    #[test]
    fn legacy_cause_idle_without_frame_holds_idle() {
        let mut fixture = Fixture::online(1);
        let sync = AnimationFrameSynchronizer::new();
        let update = PositionUpdate {
            frame: None,
            animation: None,
            cause: Some("idle".into()),
            ..position(0, 0, 0.0)
        };

        assert!(sync.handle_remote_action(&mut fixture.scene(), &update, 50));
        assert_eq!(fixture.fighters[0].animation.hold().map(|h| h.frame), Some(IDLE_FRAME));
        assert_eq!(fixture.fighters[0].remote_animation, Some(AnimationKind::Idle));
    }

    #[test]
    fn walking_update_without_frame_holds_current_frame() {
        let mut fixture = Fixture::online(0);
        let sync = AnimationFrameSynchronizer::new();
        fixture.fighters[1].frame = 2;
        let update = PositionUpdate {
            frame: None,
            animation: Some(AnimationKind::Walking),
            ..position(1, 0, 160.0)
        };

        assert!(sync.handle_remote_action(&mut fixture.scene(), &update, 100));
        assert_eq!(fixture.fighters[1].animation.hold().map(|h| h.frame), Some(2));

        assert_eq!(
            sync.update_shared_walking_animation(&mut fixture.scene(), 1, 399),
            Some(2)
        );
    }
}
