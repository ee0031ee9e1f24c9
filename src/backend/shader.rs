// Shader module loading
//
// Shaders are compiled to SPIR-V by build.rs and read from disk at startup.
// A module only needs to live until the pipeline using it is created.

use super::GpuDevice;
use crate::error::{GpuError, Result};
use ash::vk;
use std::io;
use std::path::Path;
use std::sync::Arc;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Read a SPIR-V binary into 32-bit words
pub fn read_spirv(path: &Path) -> Result<Vec<u32>> {
    let shader_error = |source: io::Error| GpuError::ShaderLoad {
        path: path.to_path_buf(),
        source,
    };

    let bytes = std::fs::read(path).map_err(shader_error)?;
    let code = ash::util::read_spv(&mut io::Cursor::new(bytes)).map_err(shader_error)?;

    if code.first() != Some(&SPIRV_MAGIC) {
        return Err(shader_error(io::Error::new(
            io::ErrorKind::InvalidData,
            "missing SPIR-V magic number",
        )));
    }

    Ok(code)
}

/// A shader module, destroyed on drop
pub struct ShaderModule<D: GpuDevice> {
    module: vk::ShaderModule,
    device: Arc<D>,
}

impl<D: GpuDevice> ShaderModule<D> {
    pub fn load(device: &Arc<D>, path: &Path) -> Result<Self> {
        let code = read_spirv(path)?;
        let module = device.create_shader_module(&code)?;
        log::debug!("Loaded shader {} ({} words)", path.display(), code.len());

        Ok(Self {
            module,
            device: device.clone(),
        })
    }

    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

impl<D: GpuDevice> Drop for ShaderModule<D> {
    fn drop(&mut self) {
        self.device.destroy_shader_module(self.module);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_spirv, write_temp_file, Call, FakeDevice};

    #[test]
    fn test_missing_file_is_a_shader_error() {
        let path = Path::new("shaders/does_not_exist.spv");
        match read_spirv(path) {
            Err(GpuError::ShaderLoad { path: failed, source }) => {
                assert_eq!(failed, path);
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected ShaderLoad, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_truncated_binary() {
        let path = write_temp_file("truncated.spv", &[0x03, 0x02, 0x23, 0x07, 0x00]);
        assert!(matches!(read_spirv(&path), Err(GpuError::ShaderLoad { .. })));
    }

    #[test]
    fn test_rejects_wrong_magic() {
        let path = write_temp_file("not_spirv.spv", &[0u8; 16]);
        assert!(matches!(read_spirv(&path), Err(GpuError::ShaderLoad { .. })));
    }

    #[test]
    fn test_module_destroyed_on_drop() {
        let device = FakeDevice::new();
        let path = write_spirv("module_drop.spv");

        let module = ShaderModule::load(&device, &path).unwrap();
        let handle = module.handle();
        drop(module);

        let calls = device.calls();
        assert_eq!(calls[0], Call::CreateShaderModule(handle));
        assert_eq!(calls[1], Call::DestroyShaderModule(handle));
    }
}
