//! Network front-end and fixed-timestep loop of the simulator.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{error, info};
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::SimulatorError;
use crate::configuration::Configuration;
use crate::http::WebServer;
use crate::protocols::controls::ControlsServer;
use crate::protocols::fdm_data::{FdmDataPublisher, FdmDataServer};
use crate::protocols::telemetry::TelemetryServer;
use crate::simulator::{Simulator, lock};

/// Binds every interface of the simulator and drives the simulation loop.
///
/// # Examples
///
/// ```no_run
/// use std::sync::{Arc, Mutex};
/// use huginn::{Configuration, KinematicModel, SimulationServer, Simulator};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let configuration = Configuration::default();
///     let simulator = Simulator::new(Box::new(KinematicModel::new()), &configuration)?;
///     let server = SimulationServer::bind(configuration, Arc::new(Mutex::new(simulator))).await?;
///
///     let cancel = CancellationToken::new();
///     let server_cancel = cancel.clone();
///     let server_handle = tokio::spawn(async move { server.run(server_cancel).await });
///
///     // Later, trigger shutdown
///     cancel.cancel();
///     server_handle.await??;
///     Ok(())
/// }
/// ```
pub struct SimulationServer {
    simulator: Arc<Mutex<Simulator>>,
    period: Duration,
    web: WebServer,
    controls: ControlsServer,
    fdm_data: FdmDataServer,
    telemetry: TelemetryServer,
    publishers: Vec<FdmDataPublisher>,
}

impl SimulationServer {
    /// Binds the web, controls, FDM data and telemetry interfaces and resolves
    /// the FDM clients.
    pub async fn bind(
        configuration: Configuration,
        simulator: Arc<Mutex<Simulator>>,
    ) -> Result<Self, SimulatorError> {
        configuration.validate()?;

        let web = WebServer::bind(&configuration.bind_address(configuration.web_port))?;
        let controls =
            ControlsServer::bind(&configuration.bind_address(configuration.controls_port)).await?;
        let fdm_data =
            FdmDataServer::bind(&configuration.bind_address(configuration.fdm_data_port)).await?;
        let telemetry =
            TelemetryServer::bind(&configuration.bind_address(configuration.telemetry_port))
                .await?;

        let mut publishers = Vec::with_capacity(configuration.fdm_clients.len());
        for client in &configuration.fdm_clients {
            publishers.push(FdmDataPublisher::bind(client).await?);
        }

        Ok(SimulationServer {
            simulator,
            period: configuration.period()?,
            web,
            controls,
            fdm_data,
            telemetry,
            publishers,
        })
    }

    pub fn simulator(&self) -> Arc<Mutex<Simulator>> {
        self.simulator.clone()
    }

    pub fn web_addr(&self) -> Option<SocketAddr> {
        self.web.local_addr()
    }

    pub fn controls_addr(&self) -> SocketAddr {
        self.controls.local_addr()
    }

    pub fn fdm_data_addr(&self) -> SocketAddr {
        self.fdm_data.local_addr()
    }

    pub fn telemetry_addr(&self) -> SocketAddr {
        self.telemetry.local_addr()
    }

    /// Runs the simulation loop and every interface until `cancel` is triggered
    /// or the model fails to run.
    ///
    /// A model failure stops all interfaces and is returned as the error.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), SimulatorError> {
        let shutdown = cancel.child_token();
        let SimulationServer {
            simulator,
            period,
            web,
            controls,
            fdm_data,
            telemetry,
            publishers,
        } = self;

        let web_task = tokio::task::spawn_blocking({
            let simulator = simulator.clone();
            let shutdown = shutdown.clone();
            move || web.serve(&simulator, &shutdown)
        });

        let mut tasks = JoinSet::new();
        tasks.spawn({
            let simulator = simulator.clone();
            let shutdown = shutdown.clone();
            async move { controls.run(simulator, shutdown).await }
        });
        tasks.spawn({
            let simulator = simulator.clone();
            let shutdown = shutdown.clone();
            async move { fdm_data.run(simulator, shutdown).await }
        });
        tasks.spawn({
            let simulator = simulator.clone();
            let shutdown = shutdown.clone();
            async move { telemetry.run(simulator, period, shutdown).await }
        });
        for publisher in publishers {
            let simulator = simulator.clone();
            let shutdown = shutdown.clone();
            tasks.spawn(async move { publisher.run(simulator, shutdown).await });
        }

        let result = run_loop(&simulator, period, &shutdown).await;

        info!("Shutting down the simulator server");
        shutdown.cancel();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Interface stopped with an error: {}", e),
                Err(e) => error!("Interface task failed: {}", e),
            }
        }
        match web_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Web server stopped with an error: {}", e),
            Err(e) => error!("Web server task failed: {}", e),
        }

        info!("The simulator server has stopped");
        result
    }
}

/// Advances the simulator once per period.
async fn run_loop(
    simulator: &Mutex<Simulator>,
    period: Duration,
    cancel: &CancellationToken,
) -> Result<(), SimulatorError> {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(
        "Starting the simulation loop at {:.1} Hz",
        1.0 / period.as_secs_f64()
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                return Ok(());
            }
            _ = ticker.tick() => {
                let result = lock(simulator).run();
                if let Err(e) = result {
                    error!("The simulator has failed to run: {}", e);
                    return Err(e);
                }
            }
        }
    }
}
