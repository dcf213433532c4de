use crate::device::Device;
use crate::error::{GpuError, Result};
use ash::vk;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const CACHE_MAGIC: [u8; 4] = *b"LUMC";
const CACHE_VERSION: u32 = 1;

/// Compiler-agnostic reflection info the core renderer needs to build
/// pipeline layouts without re-parsing SPIR-V itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionInfo {
    pub bindings: Vec<BindingReflection>,
    pub push_constant_ranges: Vec<(u32, u32)>,
    pub vertex_inputs: Vec<u32>,
    pub compute_workgroup_size: Option<[u32; 3]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingReflection {
    pub set: u32,
    pub binding: u32,
    pub descriptor_type: u32,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledShader {
    pub spirv: Vec<u32>,
    pub reflection: ReflectionInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source_hash: u64,
    pub defines_hash: u64,
    pub stage: u32,
    pub compiler_version: u32,
}

impl CacheKey {
    pub fn new(source: &str, defines: &[(String, String)], stage: vk::ShaderStageFlags, compiler_version: u32) -> Self {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        source.hash(&mut hasher);
        let source_hash = hasher.finish();

        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for (k, v) in defines {
            k.hash(&mut hasher);
            v.hash(&mut hasher);
        }
        let defines_hash = hasher.finish();

        Self {
            source_hash,
            defines_hash,
            stage: stage.as_raw() as u32,
            compiler_version,
        }
    }
}

#[derive(Default, Serialize, Deserialize)]
struct CacheIndex {
    entries: HashMap<CacheKey, CompiledShader>,
}

struct LoadedModule {
    module: vk::ShaderModule,
    refcount: usize,
}

/// Mutex-guarded, reference-counted map of loaded `vk::ShaderModule`s plus
/// a disk-backed index of previously compiled SPIR-V+reflection blobs,
/// keyed by `(source_hash, defines_hash, stage, compiler_version)` so a
/// change to source, defines, or the external compiler invalidates exactly
/// the entries it should.
pub struct ShaderCache {
    index_path: PathBuf,
    index: Mutex<CacheIndex>,
    modules: Mutex<HashMap<CacheKey, LoadedModule>>,
}

impl ShaderCache {
    pub fn open(index_path: impl AsRef<Path>) -> Result<Arc<Self>> {
        let index_path = index_path.as_ref().to_path_buf();
        let index = Self::load_index(&index_path).unwrap_or_default();

        Ok(Arc::new(Self {
            index_path,
            index: Mutex::new(index),
            modules: Mutex::new(HashMap::new()),
        }))
    }

    fn load_index(path: &Path) -> Result<CacheIndex> {
        let bytes = std::fs::read(path).map_err(|e| GpuError::CacheCorrupt(e.to_string()))?;
        if bytes.len() < 8 || bytes[0..4] != CACHE_MAGIC {
            return Err(GpuError::CacheCorrupt("bad magic".into()));
        }
        let version = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        if version != CACHE_VERSION {
            return Err(GpuError::CacheCorrupt(format!(
                "cache version {version} != {CACHE_VERSION}"
            )));
        }
        bincode::deserialize(&bytes[8..]).map_err(|e| GpuError::CacheCorrupt(e.to_string()))
    }

    pub fn save_index(&self) -> Result<()> {
        let index = self.index.lock().unwrap();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&CACHE_MAGIC);
        bytes.extend_from_slice(&CACHE_VERSION.to_le_bytes());
        bincode::serialize_into(&mut bytes, &*index)
            .map_err(|e| GpuError::CacheCorrupt(e.to_string()))?;
        std::fs::write(&self.index_path, bytes).map_err(|e| GpuError::CacheCorrupt(e.to_string()))
    }

    /// Returns a cached compile result, if any. The caller (the core
    /// renderer, through the `ShaderCompiler` collaborator trait) is
    /// responsible for invoking the compiler on a miss and calling
    /// `insert` with the result.
    pub fn get(&self, key: &CacheKey) -> Option<CompiledShader> {
        self.index.lock().unwrap().entries.get(key).cloned()
    }

    pub fn insert(&self, key: CacheKey, compiled: CompiledShader) {
        self.index.lock().unwrap().entries.insert(key, compiled);
    }

    /// Loads (or reuses) the `vk::ShaderModule` for `key`, incrementing its
    /// reference count. Call `release` when the owning pipeline is
    /// destroyed.
    pub fn module_for(&self, device: &Device, key: &CacheKey) -> Result<vk::ShaderModule> {
        let mut modules = self.modules.lock().unwrap();
        if let Some(loaded) = modules.get_mut(key) {
            loaded.refcount += 1;
            return Ok(loaded.module);
        }

        let compiled = self
            .get(key)
            .ok_or_else(|| GpuError::CompileFailed("shader not in cache".into()))?;

        let info = vk::ShaderModuleCreateInfo::builder().code(&compiled.spirv);
        let module = unsafe { device.create_shader_module(&info, None)? };
        modules.insert(
            key.clone(),
            LoadedModule {
                module,
                refcount: 1,
            },
        );
        Ok(module)
    }

    pub fn release(&self, device: &Device, key: &CacheKey) {
        let mut modules = self.modules.lock().unwrap();
        if let Some(loaded) = modules.get_mut(key) {
            loaded.refcount -= 1;
            if loaded.refcount == 0 {
                unsafe { device.destroy_shader_module(loaded.module, None) };
                modules.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_changes_with_defines() {
        let a = CacheKey::new("source", &[("A".into(), "1".into())], vk::ShaderStageFlags::COMPUTE, 1);
        let b = CacheKey::new("source", &[("A".into(), "2".into())], vk::ShaderStageFlags::COMPUTE, 1);
        assert_ne!(a, b);
    }

    #[test]
    fn cache_key_stable_for_identical_input() {
        let a = CacheKey::new("source", &[], vk::ShaderStageFlags::COMPUTE, 1);
        let b = CacheKey::new("source", &[], vk::ShaderStageFlags::COMPUTE, 1);
        assert_eq!(a, b);
    }
}
