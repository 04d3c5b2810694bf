use std::{sync::Arc, time::Duration};

use thiserror::Error;

use crate::Framework;

pub type FrameworkResult<T> = Result<T, FrameworkError>;

#[derive(Error, Debug)]
pub enum FrameworkError {
    #[error("no suitable adapter found")]
    NoAdapter,
    #[error("adapter does not support required features {0:?}")]
    MissingFeatures(wgpu::Features),
    #[error("adapter cannot support the required limits")]
    UnsupportedLimits,
    #[error(transparent)]
    RequestDevice(#[from] wgpu::RequestDeviceError),
}

/// Settings used to acquire the adapter and device.
#[derive(Debug, Clone)]
pub struct FrameworkConfig {
    pub backends: wgpu::Backends,
    pub power_preference: wgpu::PowerPreference,
    pub force_fallback_adapter: bool,
    /// Features the adapter must support. The device is created with every feature
    /// the adapter offers, these are only checked.
    pub required_features: wgpu::Features,
    pub required_limits: wgpu::Limits,
    pub label: String,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::PRIMARY,
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults(),
            label: "rndr device".to_string(),
        }
    }
}

impl FrameworkConfig {
    /// Defaults, with backend and power profile overridden by `WGPU_BACKEND` and
    /// `WGPU_POWER_PREF` when set.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backends: wgpu::util::backend_bits_from_env().unwrap_or(defaults.backends),
            power_preference: wgpu::util::power_preference_from_env()
                .unwrap_or(defaults.power_preference),
            ..defaults
        }
    }

    pub fn with_required_features(mut self, features: wgpu::Features) -> Self {
        self.required_features = features;
        self
    }

    pub fn with_required_limits(mut self, limits: wgpu::Limits) -> Self {
        self.required_limits = limits;
        self
    }

    pub fn with_fallback_adapter(mut self, force: bool) -> Self {
        self.force_fallback_adapter = force;
        self
    }
}

impl Framework {
    pub async fn new(config: FrameworkConfig) -> FrameworkResult<Self> {
        // initialize a wgpu instance to create the adapter type
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: config.backends,
            dx12_shader_compiler: wgpu::Dx12Compiler::default(),
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference,
                force_fallback_adapter: config.force_fallback_adapter,
                compatible_surface: None,
            })
            .await
            .ok_or(FrameworkError::NoAdapter)?;
        log::info!("Using adapter {:?}", adapter.get_info());

        let features = adapter.features();
        let missing = config.required_features - features;
        if !missing.is_empty() {
            return Err(FrameworkError::MissingFeatures(missing));
        }

        let supported_limits = adapter.limits();
        if !config.required_limits.check_limits(&supported_limits) {
            return Err(FrameworkError::UnsupportedLimits);
        }

        // device creates resources, queue accepts the commands recorded against them
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some(&config.label),
                    features,
                    limits: config.required_limits.clone(),
                },
                None,
            )
            .await?;

        device.on_uncaptured_error(Box::new(|err| {
            log::error!("Uncaptured wgpu error: {}", err);
        }));

        let device = Arc::new(device);
        let polling_device = Arc::downgrade(&device);

        // stops once the framework (the last strong reference) is dropped
        std::thread::spawn(move || {
            while let Some(device) = polling_device.upgrade() {
                device.poll(wgpu::Maintain::Poll);
                drop(device);
                std::thread::sleep(Duration::from_millis(10));
            }
        });

        Ok(Framework {
            device,
            queue,
            adapter,
            features,
            limits: config.required_limits,
        })
    }

    pub fn new_blocking(config: FrameworkConfig) -> FrameworkResult<Self> {
        futures::executor::block_on(Self::new(config))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    pub fn features(&self) -> wgpu::Features {
        self.features
    }

    pub fn has_feature(&self, feature: wgpu::Features) -> bool {
        self.features.contains(feature)
    }

    /// Limits the device was created with.
    pub fn limits(&self) -> &wgpu::Limits {
        &self.limits
    }

    /// Blocks until all work submitted to the queue has completed.
    pub fn wait_for_submitted_work(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }
}
