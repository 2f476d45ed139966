use pagewalk_core::{
    CollisionMask, ElementGeometry, ElementHandle, Engine, Key, NullPresenter, Params, PassThrough, Rect,
    RegistrationConfig, SoundEvent, StaticPage,
};

fn main() {
    let mut page = StaticPage::new(960.0, 1080.0);
    let shelf = ElementHandle(1);
    page.insert(shelf, ElementGeometry::single(Rect::new(0.0, 860.0, 400.0, 8.0)));

    let mut engine = Engine::new(Params::default(), &page);
    let config = RegistrationConfig::platform()
        .with_mask(CollisionMask::TOP)
        .with_pass_through(PassThrough::UPWARD);
    engine.add_element(shelf, config, &page);

    let mut jumped: u32 = 0;
    let mut landed: u32 = 0;
    let mut bonked: u32 = 0;

    for frame in 0..180 {
        if frame == 10 {
            engine.key_down(Key::Jump);
        }
        if frame == 20 {
            engine.key_up(Key::Jump);
        }

        let outcome = engine.tick(1.0 / 60.0, &page, &mut NullPresenter);
        for sound in outcome.sounds() {
            match sound.event {
                SoundEvent::Jump => jumped += 1,
                SoundEvent::Land => landed += 1,
                SoundEvent::Collide => bonked += 1,
                _ => {}
            }
        }
        outcome.dispatch();
    }

    let body = engine.body();
    println!(
        "{{\"x\":{},\"y\":{},\"vx\":{},\"vy\":{},\"grounded\":{},\"on_shelf\":{},\"jumped\":{},\"landed\":{},\"bonked\":{}}}",
        body.x,
        body.y,
        body.vx,
        body.vy,
        body.grounded,
        engine.support().is_some_and(|s| s.handle == shelf),
        jumped,
        landed,
        bonked
    );
}
