//! End-to-end behaviour of the engine against an in-memory page.

use std::cell::RefCell;
use std::rc::Rc;

use pagewalk_core::{
    CollisionMask, Direction, ElementGeometry, ElementHandle, ElementKind, Engine, GameOptions, Key,
    Params, PassThrough, PlatformEventKind, PlatformEventPayload, PlayerState, Presenter, Rect,
    RegistrationConfig, SoundEvent, SoundPayload, StaticPage,
};

const DT: f32 = 1.0 / 60.0;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Recorder {
    transforms: usize,
    sprites: Vec<PlayerState>,
}

impl Presenter for Recorder {
    fn set_transform(&mut self, _x: f32, _y: f32) {
        self.transforms += 1;
    }

    fn set_sprite(&mut self, state: PlayerState) {
        self.sprites.push(state);
    }
}

/// 1920x1080 document: floor top at 1000, character spawns at (80, 920).
fn page() -> StaticPage {
    StaticPage::new(1920.0, 1080.0)
}

fn with_platform(page: &mut StaticPage, id: u32, rect: Rect) -> ElementHandle {
    let handle = ElementHandle(id);
    page.insert(handle, ElementGeometry::single(rect));
    handle
}

/// Run `frames` ticks, returning every sound and platform event in order.
fn run(engine: &mut Engine, page: &StaticPage, frames: usize) -> (Vec<SoundPayload>, Vec<PlatformEventPayload>) {
    let mut sounds = Vec::new();
    let mut platform = Vec::new();
    let mut presenter = Recorder::default();
    for _ in 0..frames {
        let out = engine.tick(DT, page, &mut presenter);
        sounds.extend(out.sounds().cloned());
        platform.extend(out.platform_events().cloned());
        out.dispatch();
    }
    (sounds, platform)
}

fn count(sounds: &[SoundPayload], event: SoundEvent) -> usize {
    sounds.iter().filter(|s| s.event == event).count()
}

/// Jump from the floor and wait long enough to land again.
fn jump_and_settle(engine: &mut Engine, page: &StaticPage) -> (Vec<SoundPayload>, Vec<PlatformEventPayload>) {
    engine.key_down(Key::Jump);
    let out = run(engine, page, 90);
    engine.key_up(Key::Jump);
    out
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn resting_character_settles_on_the_floor() {
    let page = page();
    let mut engine = Engine::new(Params::default(), &page);
    let _ = run(&mut engine, &page, 1);

    let body = engine.body();
    assert_eq!(engine.world().ground_top, 1000.0);
    assert_eq!(body.y, 920.0);
    assert_eq!(body.vy, 0.0);
    assert!(body.grounded);
}

#[test]
fn holding_right_reaches_run_cap_then_moves_steadily() {
    let page = page();
    let mut engine = Engine::new(Params::default(), &page);
    engine.key_down(Key::Right);

    let mut xs = Vec::new();
    let mut capped_at = None;
    for frame in 0..60 {
        let _ = run(&mut engine, &page, 1);
        let body = engine.body();
        xs.push(body.x);
        if capped_at.is_none() && body.vx == 260.0 {
            capped_at = Some(frame);
        }
    }

    // 260 / 720 is about 0.36 s
    let capped_at = capped_at.expect("run speed never reached");
    assert!(capped_at <= 23, "capped at frame {capped_at}");

    let steps: Vec<f32> = xs.windows(2).skip(capped_at + 1).map(|w| w[1] - w[0]).collect();
    assert!(steps.iter().all(|s| (s - 260.0 * DT).abs() < 1e-3), "{steps:?}");
}

#[test]
fn jump_pressed_while_airborne_does_not_fire_on_landing() {
    let page = page();
    let mut engine = Engine::new(Params::default(), &page);
    let _ = run(&mut engine, &page, 1);

    engine.key_down(Key::Jump);
    let (sounds, _) = run(&mut engine, &page, 10);
    assert_eq!(count(&sounds, SoundEvent::Jump), 1);
    assert!(!engine.body().grounded);

    // re-press mid-air and keep holding through the landing
    engine.key_up(Key::Jump);
    engine.key_down(Key::Jump);
    let (sounds, _) = run(&mut engine, &page, 90);
    assert_eq!(count(&sounds, SoundEvent::Jump), 0);
    assert_eq!(count(&sounds, SoundEvent::Land), 1);
    assert!(engine.body().grounded);

    // a fresh press after landing works
    engine.key_up(Key::Jump);
    engine.key_down(Key::Jump);
    let (sounds, _) = run(&mut engine, &page, 1);
    assert_eq!(count(&sounds, SoundEvent::Jump), 1);
}

// ---------------------------------------------------------------------------
// Physics properties
// ---------------------------------------------------------------------------

#[test]
fn airborne_vy_rises_until_terminal_then_holds() {
    let params = Params {
        terminal_velocity: 400.0,
        ..Params::default()
    };
    let page = page();
    let mut engine = Engine::new(params, &page);
    engine.key_down(Key::Jump);

    let mut previous = None;
    let mut reached_terminal = false;
    for _ in 0..120 {
        let _ = run(&mut engine, &page, 1);
        let body = engine.body();
        if body.grounded {
            break;
        }
        if let Some(prev) = previous {
            if prev == 400.0 {
                assert_eq!(body.vy, 400.0);
            } else {
                assert!(body.vy > prev, "{} <= {prev}", body.vy);
            }
        }
        reached_terminal |= body.vy == 400.0;
        previous = Some(body.vy);
    }
    assert!(reached_terminal);
}

#[test]
fn standing_on_a_platform_is_stable() {
    let mut page = page();
    let a = with_platform(&mut page, 1, Rect::new(0.0, 900.0, 300.0, 20.0));
    let mut engine = Engine::new(Params::default(), &page);
    engine.add_element(a, RegistrationConfig::platform(), &page);

    let _ = jump_and_settle(&mut engine, &page);
    assert_eq!(engine.support().map(|s| s.handle), Some(a));

    let y = engine.body().y;
    for _ in 0..120 {
        let (sounds, platform) = run(&mut engine, &page, 1);
        let body = engine.body();
        assert_eq!(body.vy, 0.0);
        assert_eq!(body.y, y);
        assert!(body.grounded);
        assert!(sounds.is_empty());
        assert!(platform.is_empty());
    }
}

#[test]
fn zero_dt_keeps_a_grounded_character_grounded() {
    let mut page = page();
    let a = with_platform(&mut page, 1, Rect::new(0.0, 900.0, 300.0, 20.0));
    let mut engine = Engine::new(Params::default(), &page);
    engine.add_element(a, RegistrationConfig::platform(), &page);
    let _ = jump_and_settle(&mut engine, &page);

    let before = engine.body();
    let mut presenter = Recorder::default();
    for _ in 0..10 {
        engine.tick(0.0, &page, &mut presenter).dispatch();
    }
    assert_eq!(engine.body(), before);
    assert_eq!(engine.support().map(|s| s.handle), Some(a));
}

#[test]
fn one_way_platform_passes_rising_and_stops_falling() {
    let mut page = page();
    let a = with_platform(&mut page, 1, Rect::new(0.0, 850.0, 300.0, 10.0));
    let mut engine = Engine::new(Params::default(), &page);
    let config = RegistrationConfig::platform()
        .with_mask(CollisionMask::TOP)
        .with_pass_through(PassThrough::UPWARD);
    engine.add_element(a, config, &page);

    let (_, platform) = jump_and_settle(&mut engine, &page);
    assert!(platform.iter().all(|p| p.direction != Some(Direction::Up)));
    assert_eq!(engine.body().y, 770.0);
    assert_eq!(engine.support().map(|s| s.handle), Some(a));
}

#[test]
fn rising_past_a_one_way_top_never_grounds() {
    let mut page = page();
    // first jump frame leaves the feet at ~983.9, inside the contact tolerance
    let a = with_platform(&mut page, 1, Rect::new(0.0, 984.0, 300.0, 4.0));
    let mut engine = Engine::new(Params::default(), &page);
    engine.add_element(a, RegistrationConfig::platform(), &page);

    engine.key_down(Key::Jump);
    let (sounds, platform) = run(&mut engine, &page, 1);
    assert_eq!(count(&sounds, SoundEvent::Jump), 1);
    assert!(platform.is_empty());
    assert!(!engine.body().grounded);
    assert!(engine.body().vy < 0.0);
    assert!(engine.support().is_none());

    engine.key_up(Key::Jump);
    engine.key_down(Key::Jump);
    let (sounds, platform) = run(&mut engine, &page, 1);
    assert_eq!(count(&sounds, SoundEvent::Jump), 0);
    assert!(platform.is_empty());
    assert!(!engine.body().grounded);
    assert!(engine.body().y < 900.0);
}

#[test]
fn ceiling_stops_rising_character() {
    let mut page = page();
    let a = with_platform(&mut page, 1, Rect::new(0.0, 850.0, 300.0, 10.0));
    let mut engine = Engine::new(Params::default(), &page);
    let collides = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&collides);
    let config = RegistrationConfig::platform()
        .with_mask(CollisionMask::VERTICAL)
        .with_pass_through(PassThrough { upward: Some(false), ..PassThrough::NONE })
        .on_collide(move |p| log.borrow_mut().push((p.direction, p.speed)));
    engine.add_element(a, config, &page);

    let (sounds, _) = jump_and_settle(&mut engine, &page);
    let collides = collides.borrow();
    assert_eq!(collides.len(), 1);
    assert_eq!(collides[0].0, Some(Direction::Up));
    assert!(collides[0].1 > 0.0);
    assert_eq!(count(&sounds, SoundEvent::Collide), 1);
    // bounced off the underside and fell back to the floor
    assert_eq!(engine.body().y, 920.0);
}

#[test]
fn walls_block_side_motion() {
    let mut page = page();
    let wall = with_platform(&mut page, 1, Rect::new(400.0, 700.0, 40.0, 300.0));
    let mut engine = Engine::new(Params::default(), &page);
    let config = RegistrationConfig::new(ElementKind::Platform).with_mask(CollisionMask::ALL);
    engine.add_element(wall, config, &page);

    engine.key_down(Key::Right);
    let (sounds, platform) = run(&mut engine, &page, 120);

    assert_eq!(engine.body().x, 320.0);
    // pressing into the wall is one contact, not one per frame
    let hits: Vec<_> = platform.iter().filter(|p| p.event == PlatformEventKind::Collide).collect();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].direction, Some(Direction::Right));
    assert_eq!(count(&sounds, SoundEvent::Collide), 1);
}

#[test]
fn backing_off_a_wall_and_returning_collides_again() {
    let mut page = page();
    let wall = with_platform(&mut page, 1, Rect::new(400.0, 700.0, 40.0, 300.0));
    let mut engine = Engine::new(Params::default(), &page);
    engine.add_element(wall, RegistrationConfig::platform().with_mask(CollisionMask::ALL), &page);

    engine.key_down(Key::Right);
    let (first, _) = run(&mut engine, &page, 90);
    engine.key_up(Key::Right);
    engine.key_down(Key::Left);
    let _ = run(&mut engine, &page, 30);
    engine.key_up(Key::Left);
    engine.key_down(Key::Right);
    let (second, _) = run(&mut engine, &page, 90);

    assert_eq!(count(&first, SoundEvent::Collide), 1);
    assert_eq!(count(&second, SoundEvent::Collide), 1);
}

#[test]
fn world_edge_clamps_position_but_keeps_velocity() {
    let page = page();
    let mut engine = Engine::new(Params::default(), &page);
    engine.key_down(Key::Left);
    let _ = run(&mut engine, &page, 120);

    let body = engine.body();
    assert_eq!(body.x, 0.0);
    assert_eq!(body.vx, -260.0);
    assert_eq!(engine.state(), PlayerState::RunningLeft);
}

// ---------------------------------------------------------------------------
// Enter / leave
// ---------------------------------------------------------------------------

#[test]
fn support_change_fires_one_leave_and_one_enter() {
    let mut page = page();
    let a = with_platform(&mut page, 1, Rect::new(0.0, 900.0, 200.0, 20.0));
    let b = with_platform(&mut page, 2, Rect::new(200.0, 900.0, 300.0, 20.0));
    let mut engine = Engine::new(Params::default(), &page);

    let log: Rc<RefCell<Vec<(PlatformEventKind, ElementHandle)>>> = Rc::default();
    for handle in [a, b] {
        let enter = Rc::clone(&log);
        let leave = Rc::clone(&log);
        let config = RegistrationConfig::platform()
            .on_enter(move |p| enter.borrow_mut().push((p.event, p.platform.handle)))
            .on_leave(move |p| leave.borrow_mut().push((p.event, p.platform.handle)));
        engine.add_element(handle, config, &page);
    }

    let _ = jump_and_settle(&mut engine, &page);
    assert_eq!(*log.borrow(), vec![(PlatformEventKind::Enter, a)]);
    log.borrow_mut().clear();

    engine.key_down(Key::Right);
    let _ = run(&mut engine, &page, 60);
    engine.key_up(Key::Right);
    let _ = run(&mut engine, &page, 60);

    assert_eq!(
        *log.borrow(),
        vec![(PlatformEventKind::Leave, a), (PlatformEventKind::Enter, b)]
    );
    assert_eq!(engine.support().map(|s| s.handle), Some(b));

    log.borrow_mut().clear();
    let _ = run(&mut engine, &page, 30);
    assert!(log.borrow().is_empty());
}

#[test]
fn enter_and_leave_carry_horizontal_speed() {
    let mut page = page();
    let a = with_platform(&mut page, 1, Rect::new(0.0, 900.0, 200.0, 20.0));
    let b = with_platform(&mut page, 2, Rect::new(200.0, 900.0, 300.0, 20.0));
    let mut engine = Engine::new(Params::default(), &page);
    engine.add_element(a, RegistrationConfig::platform(), &page);
    engine.add_element(b, RegistrationConfig::platform(), &page);
    let _ = jump_and_settle(&mut engine, &page);

    engine.key_down(Key::Right);
    let (_, platform) = run(&mut engine, &page, 60);
    let changes: Vec<_> = platform
        .iter()
        .filter(|p| matches!(p.event, PlatformEventKind::Enter | PlatformEventKind::Leave))
        .collect();

    assert_eq!(changes.len(), 2);
    for change in changes {
        assert!(change.speed > 0.0);
        assert_eq!(change.speed, change.velocity.x.abs());
        assert_eq!(change.direction, None);
    }
}

#[test]
fn detached_support_is_dropped_without_callbacks() {
    let mut page = page();
    let a = with_platform(&mut page, 1, Rect::new(0.0, 900.0, 300.0, 20.0));
    let mut engine = Engine::new(Params::default(), &page);
    let leaves = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&leaves);
    engine.add_element(a, RegistrationConfig::platform().on_leave(move |_| *counter.borrow_mut() += 1), &page);
    let _ = jump_and_settle(&mut engine, &page);
    assert_eq!(engine.support().map(|s| s.handle), Some(a));

    page.detach(a);
    engine.mark_element_dirty(a);
    let (sounds, _) = run(&mut engine, &page, 60);

    assert!(!engine.registry().contains(a));
    assert_eq!(*leaves.borrow(), 0);
    assert_eq!(count(&sounds, SoundEvent::Fall), 1);
    assert_eq!(engine.body().y, 920.0);
}

#[test]
fn detached_elements_are_reported_once_for_host_cleanup() {
    let mut page = page();
    let a = with_platform(&mut page, 1, Rect::new(600.0, 700.0, 200.0, 20.0));
    let b = with_platform(&mut page, 2, Rect::new(1000.0, 700.0, 200.0, 20.0));
    let mut engine = Engine::new(Params::default(), &page);
    engine.add_element(a, RegistrationConfig::platform(), &page);
    engine.add_element(b, RegistrationConfig::platform(), &page);
    let _ = run(&mut engine, &page, 1);

    page.detach(a);
    engine.notify_environment_changed();
    let mut presenter = Recorder::default();
    let out = engine.tick(DT, &page, &mut presenter);
    assert_eq!(out.removed(), &[a]);
    out.dispatch();

    let out = engine.tick(DT, &page, &mut presenter);
    assert!(out.removed().is_empty());
    assert_eq!(engine.elements_of(ElementKind::Platform), vec![b]);
}

#[test]
fn callbacks_may_remove_elements_during_dispatch() {
    let mut page = page();
    let a = with_platform(&mut page, 1, Rect::new(0.0, 900.0, 300.0, 20.0));
    let engine = Rc::new(RefCell::new(Engine::new(Params::default(), &page)));

    let weak = Rc::downgrade(&engine);
    let config = RegistrationConfig::platform().on_enter(move |p| {
        if let Some(engine) = weak.upgrade() {
            engine.borrow_mut().remove_element(p.platform.handle);
        }
    });
    engine.borrow_mut().add_element(a, config, &page);
    engine.borrow_mut().key_down(Key::Jump);

    let mut presenter = Recorder::default();
    for _ in 0..150 {
        let outcome = engine.borrow_mut().tick(DT, &page, &mut presenter);
        outcome.dispatch();
    }

    assert!(!engine.borrow().registry().contains(a));
    assert_eq!(engine.borrow().body().y, 920.0);
}

// ---------------------------------------------------------------------------
// Footsteps
// ---------------------------------------------------------------------------

fn footstep_frames(engine: &mut Engine, page: &StaticPage, frames: usize) -> Vec<usize> {
    let mut at = Vec::new();
    for frame in 0..frames {
        let (sounds, _) = run(engine, page, 1);
        if count(&sounds, SoundEvent::Footstep) > 0 {
            at.push(frame);
        }
    }
    at
}

fn mean_gap(frames: &[usize]) -> f32 {
    let gaps: Vec<usize> = frames.windows(2).map(|w| w[1] - w[0]).collect();
    gaps.iter().sum::<usize>() as f32 / gaps.len() as f32 * DT
}

#[test]
fn walking_footsteps_follow_the_interval() {
    let page = page();
    let mut engine = Engine::new(Params::default(), &page);
    engine.key_down(Key::Walk);
    engine.key_down(Key::Right);
    let _ = run(&mut engine, &page, 30);

    let steps = footstep_frames(&mut engine, &page, 240);
    assert!(steps.len() >= 10);
    let gap = mean_gap(&steps);
    assert!((gap - 0.3).abs() <= 1.5 * DT, "walking gap {gap}");
}

#[test]
fn running_footsteps_come_faster() {
    let page = page();
    let mut engine = Engine::new(Params::default(), &page);
    engine.key_down(Key::Right);
    let _ = run(&mut engine, &page, 30);

    let steps = footstep_frames(&mut engine, &page, 240);
    let gap = mean_gap(&steps);
    assert!(gap < 0.3 - DT, "running gap {gap}");
}

#[test]
fn footstep_interval_updates_apply_next_tick() {
    let page = page();
    let mut engine = Engine::new(Params::default(), &page);
    engine.update_options(GameOptions::default().with_footstep_interval(0.6));
    engine.key_down(Key::Walk);
    engine.key_down(Key::Right);
    let _ = run(&mut engine, &page, 30);

    let gap = mean_gap(&footstep_frames(&mut engine, &page, 240));
    assert!((gap - 0.6).abs() <= 1.5 * DT, "gap {gap}");
}

#[test]
fn stopping_resets_the_footstep_timer() {
    let page = page();
    let mut engine = Engine::new(Params::default(), &page);
    engine.key_down(Key::Walk);
    engine.key_down(Key::Right);
    // long enough to almost reach a step, not to emit a second one
    let _ = run(&mut engine, &page, 30);
    engine.key_up(Key::Right);
    let _ = run(&mut engine, &page, 30);
    assert_eq!(engine.body().vx, 0.0);

    engine.key_down(Key::Right);
    let (sounds, _) = run(&mut engine, &page, 5);
    assert_eq!(count(&sounds, SoundEvent::Footstep), 0);
}

// ---------------------------------------------------------------------------
// Presentation, sound routing, lifecycle
// ---------------------------------------------------------------------------

#[test]
fn sprite_writes_only_on_state_change() {
    let page = page();
    let mut engine = Engine::new(Params::default(), &page);
    let mut presenter = Recorder::default();
    for _ in 0..30 {
        engine.tick(DT, &page, &mut presenter).dispatch();
    }
    assert_eq!(presenter.transforms, 30);
    assert_eq!(presenter.sprites, vec![PlayerState::Standing]);

    engine.key_down(Key::Right);
    for _ in 0..60 {
        engine.tick(DT, &page, &mut presenter).dispatch();
    }
    assert_eq!(
        presenter.sprites,
        vec![PlayerState::Standing, PlayerState::WalkingRight, PlayerState::RunningRight]
    );
}

#[test]
fn sounds_reach_the_configured_handler_with_support() {
    let mut page = page();
    let a = with_platform(&mut page, 1, Rect::new(0.0, 900.0, 300.0, 20.0));
    let heard: Rc<RefCell<Vec<SoundPayload>>> = Rc::default();
    let sink = Rc::clone(&heard);
    let mut engine = Engine::new(Params::default(), &page)
        .with_options(GameOptions::default().with_sound(move |_: SoundEvent, p: &SoundPayload| sink.borrow_mut().push(p.clone())));
    let config = RegistrationConfig::platform()
        .with_surface(pagewalk_core::Surface::Wood)
        .with_metadata("name", serde_json::json!("shelf"));
    engine.add_element(a, config, &page);

    let _ = jump_and_settle(&mut engine, &page);

    let heard = heard.borrow();
    let land = heard.iter().find(|p| p.event == SoundEvent::Land).expect("no landing sound");
    assert_eq!(land.surface(), pagewalk_core::Surface::Wood);
    assert!(land.intensity.is_some_and(|i| i > 0.0 && i <= 1.0));
    assert_eq!(land.metadata.as_ref().and_then(|m| m.get("name")), Some(&serde_json::json!("shelf")));
}

#[test]
fn registration_is_listed_by_kind_and_removal_is_idempotent() {
    let mut page = page();
    let a = with_platform(&mut page, 1, Rect::new(0.0, 900.0, 300.0, 20.0));
    let mut engine = Engine::new(Params::default(), &page);
    engine.add_element(a, RegistrationConfig::platform(), &page);
    assert_eq!(engine.elements_of(ElementKind::Platform), vec![a]);

    assert!(engine.remove_element(a));
    assert!(!engine.remove_element(a));
    assert!(engine.elements_of(ElementKind::Platform).is_empty());
}

#[test]
fn document_resize_moves_the_floor() {
    let mut page = page();
    let mut engine = Engine::new(Params::default(), &page);
    let _ = run(&mut engine, &page, 1);

    page.resize(1920.0, 1500.0);
    engine.notify_environment_changed();
    let _ = run(&mut engine, &page, 120);
    assert_eq!(engine.world().ground_top, 1420.0);
    assert_eq!(engine.body().y, 1340.0);
    assert!(engine.body().grounded);
}

#[test]
fn blur_releases_held_keys() {
    let page = page();
    let mut engine = Engine::new(Params::default(), &page);
    engine.key_down(Key::Right);
    let _ = run(&mut engine, &page, 20);
    engine.blur();
    let _ = run(&mut engine, &page, 60);
    assert_eq!(engine.body().vx, 0.0);
}

#[test]
fn disposed_engine_ignores_everything() {
    let mut page = page();
    let a = with_platform(&mut page, 1, Rect::new(0.0, 900.0, 300.0, 20.0));
    let mut engine = Engine::new(Params::default(), &page);
    engine.add_element(a, RegistrationConfig::platform(), &page);
    engine.dispose();
    engine.dispose();

    assert!(engine.registry().is_empty());
    engine.add_element(a, RegistrationConfig::platform(), &page);
    assert!(engine.registry().is_empty());

    let mut presenter = Recorder::default();
    let outcome = engine.tick(DT, &page, &mut presenter);
    assert!(outcome.is_empty());
    assert_eq!(presenter.transforms, 0);
}
