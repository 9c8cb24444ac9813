mod common;
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use common::{
    a_tensor, one_hot, params, qrdqn_config, Corridor, CorridorAgent, ReplayBuffer, N_STATES,
};
use qrdqn_candle_agent::{
    qrdqn::{RiskPenaltyConfig, Which},
    TensorBatch,
};
use qrdqn_core::{
    error::CoreError,
    replay_buffer::{GenericTransitionBatch, SimpleReplayBufferConfig},
    ActionSpace, Agent, ExperienceBufferBase, Policy, ReplayBufferBase,
};

fn transition(
    state: usize,
    action: i64,
    next_state: usize,
    reward: f32,
    is_terminated: i8,
) -> Result<GenericTransitionBatch<TensorBatch, TensorBatch>> {
    Ok(GenericTransitionBatch {
        obs: one_hot(&[state])?.into(),
        act: a_tensor(action)?.into(),
        next_obs: one_hot(&[next_state])?.into(),
        reward: vec![reward],
        is_terminated: vec![is_terminated],
        is_truncated: vec![0],
    })
}

fn filled_buffer(n: usize) -> Result<ReplayBuffer> {
    let mut buffer = ReplayBuffer::build(&SimpleReplayBufferConfig::default().capacity(100));
    for i in 0..n {
        let s = i % (N_STATES - 1);
        let done = (s + 1 == N_STATES - 1) as i8;
        buffer.push(transition(s, 1, s + 1, if done == 1 { 1.0 } else { -0.01 }, done)?)?;
    }
    Ok(buffer)
}

#[test]
fn terminal_targets_equal_rewards() -> Result<()> {
    let agent = CorridorAgent::build(qrdqn_config(3), &ActionSpace::Discrete(2))?;
    let next_obs = one_hot(&[1, 2, 3, 4])?;
    let reward = [0.5f32, -1.0, 2.0, 0.0];
    let tgt = agent.td_target(&next_obs, &reward, &[1, 1, 1, 1])?;
    assert_eq!(tgt.dims(), &[4, 3]);
    for (row, r) in tgt.to_vec2::<f32>()?.iter().zip(reward.iter()) {
        assert!(row.iter().all(|x| x == r));
    }
    Ok(())
}

#[test]
fn non_terminal_targets_bootstrap_from_target_network() -> Result<()> {
    let agent = CorridorAgent::build(qrdqn_config(3), &ActionSpace::Discrete(2))?;
    let next_obs = one_hot(&[2])?;
    let gamma = 0.99f32;

    // Greedy next action under the target network
    let q = agent.quantiles(Which::Target, &next_obs)?.to_vec3::<f32>()?;
    let mean = |a: usize| q[0].iter().map(|row| row[a]).sum::<f32>() / 3.0;
    let a = if mean(0) >= mean(1) { 0 } else { 1 };

    let tgt = agent.td_target(&next_obs, &[0.25], &[0])?.to_vec2::<f32>()?;
    for (i, x) in tgt[0].iter().enumerate() {
        assert!((x - (0.25 + gamma * q[0][i][a])).abs() < 1e-5);
    }
    Ok(())
}

#[test]
fn train_steps_update_online_network_only() -> Result<()> {
    let mut agent = CorridorAgent::build(qrdqn_config(8), &ActionSpace::Discrete(2))?;
    let mut buffer = filled_buffer(32)?;
    let online_before = params(agent.nets().online().get_varmap())?;
    let target_before = params(agent.nets().target().get_varmap())?;

    let record = agent.train_steps(&mut buffer, 3, 8)?;
    let loss = record.get_scalar("train/loss")?;
    assert!(loss >= 0.0 && loss.is_finite());
    assert_eq!(record.get_scalar("train/n_updates")?, 3.0);
    assert_eq!(agent.n_updates(), 3);

    assert_ne!(params(agent.nets().online().get_varmap())?, online_before);
    assert_eq!(params(agent.nets().target().get_varmap())?, target_before);
    Ok(())
}

#[test]
fn buffer_underflow_is_an_error() -> Result<()> {
    let mut agent = CorridorAgent::build(qrdqn_config(4), &ActionSpace::Discrete(2))?;
    let mut buffer = filled_buffer(3)?;
    let err = agent.train_steps(&mut buffer, 1, 8).err().unwrap();
    assert!(matches!(
        err.downcast_ref::<CoreError>(),
        Some(CoreError::InsufficientTransitions {
            requested: 8,
            stored: 3
        })
    ));
    assert_eq!(agent.n_updates(), 0);
    Ok(())
}

#[test]
fn env_steps_drive_target_sync_and_exploration() -> Result<()> {
    // Target update every 10 env steps, tau = 1
    let mut agent = CorridorAgent::build(qrdqn_config(4), &ActionSpace::Discrete(2))?;
    let mut buffer = filled_buffer(16)?;
    Agent::<Corridor, ReplayBuffer>::train(&mut agent);

    agent.train_steps(&mut buffer, 2, 8)?;
    let online = params(agent.nets().online().get_varmap())?;
    assert_ne!(params(agent.nets().target().get_varmap())?, online);

    for t in 1..10 {
        let record = agent.on_env_step(t, 1.0 - t as f64 / 100.0)?;
        let rate = record.get_scalar("rollout/exploration_rate")?;
        assert!(rate <= 1.0 && rate >= 0.05);
    }
    assert_ne!(params(agent.nets().target().get_varmap())?, online);

    agent.on_env_step(10, 0.9)?;
    assert_eq!(params(agent.nets().target().get_varmap())?, online);

    // Past the exploration fraction of 0.5
    agent.on_env_step(60, 0.4)?;
    assert_eq!(agent.exploration_rate(), 0.05);
    Ok(())
}

#[test]
fn mask_source_restricts_target_actions() -> Result<()> {
    // In state 0, only action 1 is valid
    let agent = CorridorAgent::build(qrdqn_config(3), &ActionSpace::Discrete(2))?
        .with_mask_source(Box::new(Corridor::mask_table()));
    let next_obs = one_hot(&[0])?;
    let q = agent.quantiles(Which::Target, &next_obs)?.to_vec3::<f32>()?;

    let tgt = agent.td_target(&next_obs, &[0.0], &[0])?.to_vec2::<f32>()?;
    for (i, x) in tgt[0].iter().enumerate() {
        assert!((x - 0.99 * q[0][i][1]).abs() < 1e-5);
    }
    Ok(())
}

#[test]
fn risk_penalty_is_used_for_targets() -> Result<()> {
    let config = qrdqn_config(3).risk(RiskPenaltyConfig::Variance { weight: 100.0 });
    let agent = CorridorAgent::build(config, &ActionSpace::Discrete(2))?;
    let next_obs = one_hot(&[3])?;
    let q = agent.quantiles(Which::Target, &next_obs)?;

    // Action with the smaller spread wins under a large variance penalty
    let per_action = q.to_dtype(DType::F32)?.squeeze(0)?.t()?.contiguous()?.to_vec2::<f32>()?;
    let spread = |a: usize| {
        let m = per_action[a].iter().sum::<f32>() / 3.0;
        per_action[a].iter().map(|x| (x - m).powi(2)).sum::<f32>()
    };
    let a = if spread(0) <= spread(1) { 0 } else { 1 };

    let tgt = agent.td_target(&next_obs, &[0.0], &[0])?;
    let expected = (q.squeeze(0)?.narrow(1, a, 1)?.squeeze(1)? * 0.99)?;
    let diff = (tgt.squeeze(0)? - expected)?.abs()?.max(0)?.to_scalar::<f32>()?;
    assert!(diff < 1e-5);
    Ok(())
}

#[test]
fn save_and_load_params() -> Result<()> {
    let dir = tempdir::TempDir::new("qrdqn_agent")?;
    let mut agent = CorridorAgent::build(qrdqn_config(4), &ActionSpace::Discrete(2))?;
    let mut buffer = filled_buffer(16)?;
    agent.train_steps(&mut buffer, 1, 8)?;
    Agent::<Corridor, ReplayBuffer>::save_params(&agent, dir.path())?;

    let mut agent_ = CorridorAgent::build(qrdqn_config(4).seed(1), &ActionSpace::Discrete(2))?;
    Agent::<Corridor, ReplayBuffer>::load_params(&mut agent_, dir.path())?;

    let obs = one_hot(&[0, 1, 2, 3, 4])?;
    let q = agent.quantiles(Which::Online, &obs)?;
    let q_ = agent_.quantiles(Which::Online, &obs)?;
    let diff = (q - q_)?.abs()?.flatten_all()?.max(0)?.to_scalar::<f32>()?;
    assert_eq!(diff, 0.0);
    Ok(())
}

#[test]
fn zero_loss_for_matching_degenerate_distribution() -> Result<()> {
    let current = Tensor::full(1.5f32, (4, 6), &Device::Cpu)?;
    let loss = qrdqn_candle_agent::util::quantile_huber_loss(&current, &current, true)?;
    assert_eq!(loss.to_scalar::<f32>()?, 0.0);
    Ok(())
}

#[test]
fn wide_mask_is_rejected_during_warm_up() -> Result<()> {
    let mut agent =
        CorridorAgent::build(qrdqn_config(4).learning_starts(100), &ActionSpace::Discrete(2))?;
    Agent::<Corridor, ReplayBuffer>::train(&mut agent);
    let obs = one_hot(&[1])?;

    let wide = [false, false, true];
    for _ in 0..50 {
        let err = Policy::<Corridor>::sample(&mut agent, &obs, Some(&wide[..]))
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::InvalidActionMask(_))
        ));
    }

    // Valid masks still work in the warm-up branch
    for _ in 0..50 {
        let act = Policy::<Corridor>::sample(&mut agent, &obs, Some(&[false, true][..]))?;
        assert_eq!(act.to_vec1::<i64>()?, vec![1]);
    }
    Ok(())
}

#[test]
fn wide_mask_is_rejected_when_greedy() -> Result<()> {
    let mut agent = CorridorAgent::build(qrdqn_config(4), &ActionSpace::Discrete(2))?;
    Agent::<Corridor, ReplayBuffer>::eval(&mut agent);
    let obs = one_hot(&[1])?;
    let res = Policy::<Corridor>::sample(&mut agent, &obs, Some(&[false, false, true][..]));
    assert!(res.is_err());
    Ok(())
}

#[test]
fn scalar_observation_is_an_error() -> Result<()> {
    let mut agent = CorridorAgent::build(qrdqn_config(4), &ActionSpace::Discrete(2))?;
    let obs = Tensor::new(1f32, &Device::Cpu)?;
    assert!(agent.quantiles(Which::Online, &obs).is_err());
    assert!(agent.predict(&obs, true, None).is_err());
    Ok(())
}
