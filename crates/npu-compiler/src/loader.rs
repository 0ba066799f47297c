// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Loading a compiler service from a shared library.

use crate::{
    CompiledArtifact, CompilerError, CompilerResult, CompilerService, SupportedOps,
};
use libloading::{Library, Symbol};
use npu_common::{Model, NetworkMetadata, NpuConfig, ProfilingEntry};
use std::fmt;
use std::path::{Path, PathBuf};

/// Symbol every compiler library exports.
pub const CREATE_COMPILER_SYMBOL: &str = "CreateNPUCompiler";

/// Library name without platform prefix, suffix or build postfix.
pub const COMPILER_LIBRARY_BASE_NAME: &str = "npu_mlir_compiler";

/// Signature of [`CREATE_COMPILER_SYMBOL`]. The returned pointer owns a
/// boxed service and is released by the loader.
pub type CreateCompilerFn = unsafe extern "C" fn() -> *mut Box<dyn CompilerService>;

const BUILD_POSTFIX: &str = if cfg!(all(windows, debug_assertions)) {
    "d"
} else {
    ""
};

/// Full path of the compiler library inside `dir`, using the platform's
/// shared library naming (`libnpu_mlir_compiler.so`,
/// `npu_mlir_compiler.dll`, ...).
pub fn compiler_library_path(dir: &Path) -> PathBuf {
    dir.join(libloading::library_filename(format!(
        "{COMPILER_LIBRARY_BASE_NAME}{BUILD_POSTFIX}"
    )))
}

/// A compiler service living in a dynamically loaded library.
///
/// Fields drop in declaration order, so the service is destroyed before
/// its code is unmapped.
pub struct CompilerLibrary {
    service: Box<dyn CompilerService>,
    path: PathBuf,
    _library: Library,
}

impl CompilerLibrary {
    /// Loads the library at `path` and instantiates its service.
    ///
    /// # Safety
    ///
    /// Loading a library runs its initialisers. The library must export
    /// [`CREATE_COMPILER_SYMBOL`] with the [`CreateCompilerFn`] signature
    /// and be built with the same Rust toolchain as the caller, e.g. via
    /// [`crate::export_compiler!`].
    pub unsafe fn load(path: &Path) -> CompilerResult<Self> {
        let lib_path = path.display().to_string();
        tracing::debug!("Loading compiler library {lib_path}");

        let library = Library::new(path).map_err(|e| CompilerError::LibraryLoad {
            path: lib_path.clone(),
            detail: e.to_string(),
        })?;

        let service = {
            let create: Symbol<CreateCompilerFn> = library
                .get(CREATE_COMPILER_SYMBOL.as_bytes())
                .map_err(|e| CompilerError::SymbolLoad {
                    path: lib_path.clone(),
                    symbol: CREATE_COMPILER_SYMBOL.to_string(),
                    detail: e.to_string(),
                })?;
            let raw = create();
            if raw.is_null() {
                return Err(CompilerError::SymbolLoad {
                    path: lib_path,
                    symbol: CREATE_COMPILER_SYMBOL.to_string(),
                    detail: "factory returned null".into(),
                });
            }
            *Box::from_raw(raw)
        };

        tracing::info!(
            "Loaded compiler from {lib_path} (interface version {:#x})",
            service.get_version()
        );
        Ok(Self {
            service,
            path: path.to_path_buf(),
            _library: library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for CompilerLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerLibrary")
            .field("path", &self.path)
            .field("service", &self.service)
            .finish()
    }
}

impl CompilerService for CompilerLibrary {
    fn get_version(&self) -> u32 {
        self.service.get_version()
    }

    fn compile(&self, model: &Model, config: &NpuConfig) -> CompilerResult<CompiledArtifact> {
        self.service.compile(model, config)
    }

    fn compile_ws_v1(
        &self,
        model: &Model,
        config: &NpuConfig,
    ) -> CompilerResult<Vec<CompiledArtifact>> {
        self.service.compile_ws_v1(model, config)
    }

    fn compile_ws_v2(
        &self,
        model: &Model,
        config: &NpuConfig,
    ) -> CompilerResult<Option<CompiledArtifact>> {
        self.service.compile_ws_v2(model, config)
    }

    fn compile_ws_v3(
        &self,
        model: &mut Model,
        config: &NpuConfig,
        stage: usize,
    ) -> CompilerResult<Option<CompiledArtifact>> {
        self.service.compile_ws_v3(model, config, stage)
    }

    fn parse(&self, blob: &[u8], config: &NpuConfig) -> CompilerResult<NetworkMetadata> {
        self.service.parse(blob, config)
    }

    fn query(&self, model: &Model, config: &NpuConfig) -> CompilerResult<SupportedOps> {
        self.service.query(model, config)
    }

    fn process_profiling_output(
        &self,
        raw: &[u8],
        blob: &[u8],
        config: &NpuConfig,
    ) -> CompilerResult<Vec<ProfilingEntry>> {
        self.service.process_profiling_output(raw, blob, config)
    }
}

/// Exports [`CREATE_COMPILER_SYMBOL`] for a compiler type implementing
/// [`CompilerService`] and [`Default`].
///
/// ```ignore
/// npu_compiler::export_compiler!(MyCompiler);
/// ```
#[macro_export]
macro_rules! export_compiler {
    ($compiler:ty) => {
        #[no_mangle]
        #[allow(non_snake_case)]
        pub extern "C" fn CreateNPUCompiler() -> *mut Box<dyn $crate::CompilerService> {
            let service: Box<dyn $crate::CompilerService> = Box::new(<$compiler>::default());
            Box::into_raw(Box::new(service))
        }
    };
}
