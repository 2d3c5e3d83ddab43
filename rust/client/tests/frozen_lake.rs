mod common;

use common::*;
use float_eq::*;
use gymnasium::*;
use serde_json::to_value;

#[test]
#[ignore = "requires a gym-http-api server on 127.0.0.1:40004"]
fn fl_advanced_make_env_e2e() {
    let env = Environment::new(
        GYM_SERVER,
        "FrozenLake-v1",
        Some(1),
        Some(false),
        Some(true),
        &[
            ("render_mode", to_value("ansi").unwrap()),
            ("is_slippery", to_value(false).unwrap()),
            ("desc", to_value(["GGGH", "GSGH", "GGGF", "FFFG"]).unwrap()),
        ],
    )
    .unwrap();
    assert_eq!(env.name().unwrap(), "FrozenLake-v1");
    assert_eq!(discrete_value(env.observation_space()), 16);
    assert_eq!(discrete_value(env.action_space()), 4);

    let s = env.reset(Some(2718)).unwrap();
    assert_eq!(discrete_item_value(&s[0]), 5);

    let si = env.step(&[ObsActSpaceItem::Discrete(1)]).unwrap();
    assert_eq!(discrete_item_value(&si.observation[0]), 9);
    assert!(si.terminated);
    assert!(si.truncated);
    assert_float_eq!(si.reward, 1., rmax <= 1e-16);

    env.close().unwrap();
}

#[test]
#[ignore = "requires a gym-http-api server on 127.0.0.1:40004"]
fn fl_rejects_out_of_range_action_without_calling_server() {
    let env = Environment::new(GYM_SERVER, "FrozenLake-v1", None, None, None, &[]).unwrap();
    env.reset(Some(1)).unwrap();

    let err = env.step(&[ObsActSpaceItem::Discrete(7)]).unwrap_err();
    assert!(matches!(err, Error::InvalidAction(_)));
}
