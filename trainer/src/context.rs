use log::info;
use machine_learning::arch::Device;

use crate::{
    Result,
    config::OptimizerSettings,
    group::Networks,
    optimizer::OptimizerManager,
    routine::RoutineRegistry,
};

/// Everything a training run owns, built once at setup.
pub struct TrainingContext {
    pub networks: Networks,
    pub optimizers: OptimizerManager,
    pub routines: RoutineRegistry,
    device: Device,
}

impl TrainingContext {
    /// Places the networks, builds their optimizers and checks the routines against them.
    ///
    /// # Arguments
    /// * `networks` - Every network group of the model.
    /// * `routines` - The routines to run every step, in order.
    /// * `settings` - The optimizer settings.
    /// * `device` - Where to place the networks.
    ///
    /// # Returns
    /// The context, a resource error if a group can't be placed, a configuration error for
    /// incomplete optimizer settings or a structural error if a routine reads a group without
    /// an optimizer.
    pub fn setup(
        mut networks: Networks,
        routines: RoutineRegistry,
        settings: &OptimizerSettings,
        device: Device,
    ) -> Result<Self> {
        networks.to_device(device)?;

        let optimizers = OptimizerManager::setup(&networks, settings)?;
        routines.validate(&networks, &optimizers)?;

        info!(
            groups = networks.len(),
            routines = routines.len();
            "training context ready on {device}"
        );

        Ok(Self {
            networks,
            optimizers,
            routines,
            device,
        })
    }

    pub fn device(&self) -> Device {
        self.device
    }
}
