mod common;
use anyhow::Result;
use candle_core::Device;
use common::{one_hot, params, N_STATES};
use qrdqn_candle_agent::{
    mlp::{Mlp, MlpConfig},
    opt::OptimizerConfig,
    qrdqn::{QrdqnModelConfig, TargetNetworkManager, Which},
};
use qrdqn_core::ActionSpace;
use tempdir::TempDir;

fn manager() -> Result<TargetNetworkManager<Mlp>> {
    let model_config = QrdqnModelConfig::default()
        .q_config(MlpConfig::new(N_STATES, vec![8], 0))
        .n_quantiles(5);
    let opt_config = OptimizerConfig::Adam { lr: 1e-2, eps: 1e-8 };
    TargetNetworkManager::build(
        model_config,
        &opt_config,
        &ActionSpace::Discrete(3),
        Device::Cpu,
    )
}

/// Moves the online network away from the target one.
fn perturb_online(nets: &mut TargetNetworkManager<Mlp>) -> Result<()> {
    let obs = one_hot(&[0, 1, 2, 3])?;
    let loss = nets.forward(Which::Online, &obs)?.sqr()?.mean_all()?;
    nets.backward_step(&loss, None)?;
    Ok(())
}

#[test]
fn target_is_a_copy_after_build() -> Result<()> {
    let nets = manager()?;
    assert_eq!(
        params(nets.online().get_varmap())?,
        params(nets.target().get_varmap())?
    );
    Ok(())
}

#[test]
fn gradient_steps_leave_target_untouched() -> Result<()> {
    let mut nets = manager()?;
    let target_before = params(nets.target().get_varmap())?;
    let online_before = params(nets.online().get_varmap())?;
    perturb_online(&mut nets)?;
    assert_eq!(params(nets.target().get_varmap())?, target_before);
    assert_ne!(params(nets.online().get_varmap())?, online_before);
    Ok(())
}

#[test]
fn hard_sync_is_exact_and_idempotent() -> Result<()> {
    let mut nets = manager()?;
    perturb_online(&mut nets)?;
    nets.sync_hard()?;
    let online = params(nets.online().get_varmap())?;
    assert_eq!(params(nets.target().get_varmap())?, online);
    nets.sync_hard()?;
    assert_eq!(params(nets.target().get_varmap())?, online);
    Ok(())
}

#[test]
fn soft_sync_endpoints() -> Result<()> {
    let mut nets = manager()?;
    perturb_online(&mut nets)?;

    let target_before = params(nets.target().get_varmap())?;
    nets.sync_soft(0.0)?;
    assert_eq!(params(nets.target().get_varmap())?, target_before);

    nets.sync_soft(1.0)?;
    assert_eq!(
        params(nets.target().get_varmap())?,
        params(nets.online().get_varmap())?
    );

    assert!(nets.sync_soft(1.5).is_err());
    assert!(nets.sync_soft(-0.1).is_err());
    Ok(())
}

#[test]
fn soft_sync_interpolates() -> Result<()> {
    let mut nets = manager()?;
    let target_before = params(nets.target().get_varmap())?;
    perturb_online(&mut nets)?;
    let online = params(nets.online().get_varmap())?;
    nets.sync_soft(0.25)?;

    for ((t, t0), o) in params(nets.target().get_varmap())?
        .iter()
        .zip(target_before.iter())
        .zip(online.iter())
    {
        for ((x, x0), y) in t.1.iter().zip(t0.1.iter()).zip(o.1.iter()) {
            assert!((x - (0.25 * y + 0.75 * x0)).abs() < 1e-5);
        }
    }
    Ok(())
}

#[test]
fn save_and_load() -> Result<()> {
    let dir = TempDir::new("qrdqn_nets")?;
    let mut nets = manager()?;
    perturb_online(&mut nets)?;
    nets.save(dir.path())?;
    assert!(dir.path().join("online.safetensors").exists());
    assert!(dir.path().join("target.safetensors").exists());

    let mut nets_ = manager()?;
    nets_.load(dir.path())?;
    assert_eq!(
        params(nets_.online().get_varmap())?,
        params(nets.online().get_varmap())?
    );
    assert_eq!(
        params(nets_.target().get_varmap())?,
        params(nets.target().get_varmap())?
    );
    Ok(())
}
