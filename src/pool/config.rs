//! Pool configuration
//!
//! [`PoolConfig`] is the resolved, in-memory form bound to an [`ActorClass`].
//! [`RegistryConfig`] is its serialisable counterpart, loaded from RON and
//! resolved against the classes registered in a [`World`].
//!
//! # Example (RON)
//!
//! ```ron
//! (
//!     pools: [
//!         (class: "Bullet", preset: Some(Bullet)),
//!         (class: "Grunt", initial_size: Some(12), hard_limit: Some(40),
//!          preallocation: Some((strategy: Progressive, target_count: 30))),
//!     ],
//! )
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, PoolResult};
use crate::prealloc::PreallocConfig;
use crate::scene::{ActorClass, ClassKind, World};

/// Default initial size for plain actor classes
pub const DEFAULT_POOL_SIZE: usize = 10;
/// Default hard limit for plain actor classes
pub const DEFAULT_HARD_LIMIT: usize = 100;
/// Largest accepted initial size
pub const MAX_INITIAL_SIZE: usize = 1000;

/// Named sizing presets for common pooled object types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolPreset {
    /// 50 initial, 200 hard
    Bullet,
    /// 20 initial, 100 hard
    Enemy,
    /// 15 initial, 50 hard
    Effect,
}

impl PoolPreset {
    /// `(initial_size, hard_limit)` for this preset
    #[must_use]
    pub const fn sizes(self) -> (usize, usize) {
        match self {
            Self::Bullet => (50, 200),
            Self::Enemy => (20, 100),
            Self::Effect => (15, 50),
        }
    }
}

/// Sizing defaults for a class kind: `(initial_size, hard_limit)`
#[must_use]
pub const fn class_defaults(kind: ClassKind) -> (usize, usize) {
    match kind {
        ClassKind::Character => (5, 20),
        ClassKind::Pawn => (8, 30),
        ClassKind::Actor => (DEFAULT_POOL_SIZE, DEFAULT_HARD_LIMIT),
    }
}

/// Configuration of a single class pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Class the pool manages
    pub class: ActorClass,
    /// Objects created by prewarming
    pub initial_size: usize,
    /// Maximum retained objects; 0 means unlimited
    pub hard_limit: usize,
    /// Whether initialisation prewarms `initial_size` objects
    pub enable_prewarm: bool,
}

impl PoolConfig {
    /// Config with the sizing defaults of the class kind
    #[must_use]
    pub fn new(class: ActorClass) -> Self {
        let (initial_size, hard_limit) = class_defaults(class.kind());
        Self {
            class,
            initial_size,
            hard_limit,
            enable_prewarm: true,
        }
    }

    /// Config with a named preset's sizing
    #[must_use]
    pub fn for_preset(class: ActorClass, preset: PoolPreset) -> Self {
        let (initial_size, hard_limit) = preset.sizes();
        Self::new(class)
            .with_initial_size(initial_size)
            .with_hard_limit(hard_limit)
    }

    /// Set the prewarm size
    #[must_use]
    pub fn with_initial_size(mut self, initial_size: usize) -> Self {
        self.initial_size = initial_size;
        self
    }

    /// Set the hard limit (0 for unlimited)
    #[must_use]
    pub fn with_hard_limit(mut self, hard_limit: usize) -> Self {
        self.hard_limit = hard_limit;
        self
    }

    /// Enable or disable prewarming on initialisation
    #[must_use]
    pub fn with_prewarm(mut self, enabled: bool) -> Self {
        self.enable_prewarm = enabled;
        self
    }

    /// Fill an unset initial size from the class defaults and clamp it
    pub fn apply_defaults(&mut self) {
        if self.initial_size == 0 {
            self.initial_size = class_defaults(self.class.kind()).0;
        }
        self.initial_size = self.initial_size.min(MAX_INITIAL_SIZE);
    }

    /// Check the config can back a pool
    pub fn validate(&self) -> PoolResult<()> {
        if self.class.is_abstract() {
            return Err(PoolError::Config(format!(
                "class {} is abstract",
                self.class.name()
            )));
        }
        if self.initial_size == 0 {
            return Err(PoolError::Config("initial size must be positive".into()));
        }
        if self.initial_size > MAX_INITIAL_SIZE {
            return Err(PoolError::Config(format!(
                "initial size {} exceeds {MAX_INITIAL_SIZE}",
                self.initial_size
            )));
        }
        if self.hard_limit != 0 && self.hard_limit < self.initial_size {
            return Err(PoolError::Config(format!(
                "hard limit {} is below initial size {}",
                self.hard_limit, self.initial_size
            )));
        }
        Ok(())
    }

    /// Whether [`validate`](Self::validate) passes
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

// ============================================================================
// Serialisable configuration
// ============================================================================

/// One pool entry in a [`RegistryConfig`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfigEntry {
    /// Name of a class registered with the world
    pub class: String,
    /// Sizing preset; explicit sizes below override it
    #[serde(default)]
    pub preset: Option<PoolPreset>,
    #[serde(default)]
    pub initial_size: Option<usize>,
    #[serde(default)]
    pub hard_limit: Option<usize>,
    #[serde(default = "default_prewarm")]
    pub enable_prewarm: bool,
    /// Attach a preallocator with this config
    #[serde(default)]
    pub preallocation: Option<PreallocConfig>,
}

fn default_prewarm() -> bool {
    true
}

impl PoolConfigEntry {
    /// Resolve the entry against the classes registered in `world`
    pub fn resolve(&self, world: &World) -> PoolResult<PoolConfig> {
        let class = world
            .find_class(&self.class)
            .ok_or_else(|| PoolError::Config(format!("unknown class '{}'", self.class)))?;

        let mut config = match self.preset {
            Some(preset) => PoolConfig::for_preset(class, preset),
            None => PoolConfig::new(class),
        };
        if let Some(initial_size) = self.initial_size {
            config.initial_size = initial_size;
        }
        if let Some(hard_limit) = self.hard_limit {
            config.hard_limit = hard_limit;
        }
        config.enable_prewarm = self.enable_prewarm;
        config.validate()?;
        Ok(config)
    }
}

/// Registry-wide configuration loaded from RON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub pools: Vec<PoolConfigEntry>,
}

impl RegistryConfig {
    /// Parse a RON document
    pub fn from_ron_str(source: &str) -> PoolResult<Self> {
        ron::from_str(source).map_err(|e| PoolError::Config(e.to_string()))
    }

    /// Read and parse a RON file
    pub fn load(path: impl AsRef<Path>) -> PoolResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| PoolError::Config(format!("{}: {e}", path.display())))?;
        Self::from_ron_str(&source)
    }

    /// Serialise to pretty RON
    pub fn to_ron_string(&self) -> PoolResult<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| PoolError::Config(e.to_string()))
    }
}
