//! Dynamic module loading: `import` and `link`

use super::Cpu;
use crate::vm::ffi::{ForeignFn, Library};
use crate::vm::{RuntimeException, VmResult};
use std::ffi::{c_char, CStr};
use viua_bytecode::BytecodeReader;

/// `exports_names` symbol: NULL-terminated array of C strings
type ExportsNamesFn = unsafe extern "C" fn() -> *const *const c_char;
/// `exports_pointers` symbol: array parallel to `exports_names`
type ExportsPointersFn = unsafe extern "C" fn() -> *const ForeignFn;

impl Cpu {
    /// Load a native module and register its exported functions as
    /// `<module>.<function>`
    pub(super) fn op_import(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let module = reader.read_cstr()?;
        let next = reader.position();

        self.import_module(&module)?;
        Ok(next)
    }

    /// Static linking is resolved by the assembler; at runtime `link`
    /// only skips its operand
    pub(super) fn op_link(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let _module = reader.read_cstr()?;
        Ok(reader.position())
    }

    /// Locate, open and register a native module
    pub fn import_module(&mut self, module: &str) -> VmResult<()> {
        let path = self.search_path.find(module).ok_or_else(|| {
            RuntimeException::new(format!("failed to link library: {}", module))
        })?;
        let library = Library::open(&path)
            .map_err(|err| RuntimeException::new(err.to_string()))?;

        unsafe {
            let names: ExportsNamesFn = library.get("exports_names").map_err(|_| {
                RuntimeException::new(format!(
                    "failed to extract function names from module: {}",
                    module
                ))
            })?;
            let pointers: ExportsPointersFn = library.get("exports_pointers").map_err(|_| {
                RuntimeException::new(format!(
                    "failed to extract function pointers from module: {}",
                    module
                ))
            })?;

            let names = names();
            let pointers = pointers();
            let mut index = 0;
            while !(*names.add(index)).is_null() {
                let name = CStr::from_ptr(*names.add(index))
                    .to_string_lossy()
                    .into_owned();
                self.foreign_functions
                    .insert(format!("{}.{}", module, name), *pointers.add(index));
                index += 1;
            }
        }

        // The handle must outlive every registered function pointer.
        self.libraries.push(library);
        Ok(())
    }
}
