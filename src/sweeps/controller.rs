use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::Engine;

use super::loop_worker::{controller_sweep_loop, flight_sweep_loop};

/// Starts and stops the periodic controller and flight sweeps.
#[derive(Default)]
pub struct SweepController {
    handles: Vec<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl SweepController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.cancel_token.is_some()
    }

    pub fn start(&mut self, engine: &Engine) -> Result<()> {
        if self.is_running() {
            bail!("sweeps already running");
        }

        let config = engine.config();
        let cancel_token = CancellationToken::new();

        self.handles.push(tokio::spawn(controller_sweep_loop(
            engine.sessions().clone(),
            config.controller_sweep_interval(),
            cancel_token.clone(),
        )));
        self.handles.push(tokio::spawn(flight_sweep_loop(
            engine.flights().clone(),
            config.flight_sweep_interval(),
            cancel_token.clone(),
        )));

        info!(
            "Sweeps started (controllers every {:?}, flights every {:?})",
            config.controller_sweep_interval(),
            config.flight_sweep_interval()
        );
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        for handle in self.handles.drain(..) {
            handle.await.context("sweep task failed to join")?;
        }
        Ok(())
    }
}
