//! Block type registry.
//!
//! Maps a type name, as given in `CREATE FB`, to its descriptor and a
//! constructor for fresh instances.

use crate::block::FunctionBlock;
use fbrun_core::{CoreError, CoreResult, TypeDescriptor};
use indexmap::IndexMap;
use std::sync::Arc;

/// Constructor for block instances
pub type BlockFactory = Arc<dyn Fn(&TypeDescriptor) -> Box<dyn FunctionBlock> + Send + Sync>;

/// Error from registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Type already registered
    #[error("Block type already registered: {name}")]
    AlreadyRegistered {
        /// Type name
        name: String,
    },

    /// Descriptor rejected
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(#[from] CoreError),
}

/// Entry for a registered block type
#[derive(Clone)]
pub struct BlockType {
    /// Port schema
    pub descriptor: Arc<TypeDescriptor>,
    /// Constructor
    pub factory: BlockFactory,
}

impl BlockType {
    /// Build a new instance
    #[must_use]
    pub fn instantiate(&self) -> Box<dyn FunctionBlock> {
        (self.factory)(&self.descriptor)
    }
}

impl std::fmt::Debug for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockType")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Registry of block types
#[derive(Debug, Default)]
pub struct BlockRegistry {
    types: IndexMap<String, BlockType>,
}

impl BlockRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            types: IndexMap::new(),
        }
    }

    /// Create a registry holding the built-in block library
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::blocks::register_builtins(&mut registry);
        registry
    }

    /// Register a block type
    ///
    /// # Errors
    ///
    /// Returns error if the descriptor is invalid or the name is taken
    pub fn register<F>(
        &mut self,
        descriptor: TypeDescriptor,
        factory: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&TypeDescriptor) -> Box<dyn FunctionBlock> + Send + Sync + 'static,
    {
        descriptor.validate()?;

        let name = descriptor.type_name.clone();
        if self.types.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered { name });
        }

        self.types.insert(
            name,
            BlockType {
                descriptor: Arc::new(descriptor),
                factory: Arc::new(factory),
            },
        );
        Ok(())
    }

    /// Get a block type by name
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the type is unknown
    pub fn get(&self, type_name: &str) -> CoreResult<&BlockType> {
        self.types
            .get(type_name)
            .ok_or_else(|| CoreError::not_found("block type", type_name))
    }

    /// Check if a type is registered
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// List registered type names
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.types.keys().cloned().collect()
    }
}
