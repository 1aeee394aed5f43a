//! Typesystem opcode handlers: prototype construction, registration,
//! instantiation and message dispatch

use super::Cpu;
use crate::vm::value::{Prototype, Value};
use crate::vm::{RuntimeException, VmResult};
use viua_bytecode::BytecodeReader;

impl Cpu {
    /// `class`/`prototype`: create a prototype in a register
    pub(super) fn op_class(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let target = reader.read_reg()?;
        let class_name = reader.read_cstr()?;
        let next = reader.position();

        let target = self.resolve(target)?;
        self.place(target, Value::Prototype(Prototype::new(class_name)))?;
        Ok(next)
    }

    /// Record a supertype on the prototype held in a register
    pub(super) fn op_derive(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let target = reader.read_reg()?;
        let base_name = reader.read_cstr()?;
        let next = reader.position();

        let target = self.resolve(target)?;
        let prototype = self.fetch(target)?;
        let mut prototype = prototype.borrow_mut();
        match &mut *prototype {
            Value::Prototype(proto) => proto.derive(base_name),
            other => {
                return Err(RuntimeException::type_error(format!(
                    "expected Prototype, got {}",
                    other.type_name()
                )))
            }
        }
        Ok(next)
    }

    /// Record a method binding on the prototype held in a register
    pub(super) fn op_attach(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let target = reader.read_reg()?;
        let function_name = reader.read_cstr()?;
        let method_name = reader.read_cstr()?;
        let next = reader.position();

        let target = self.resolve(target)?;
        if !self.function_addresses.contains_key(&function_name)
            && !self.foreign_functions.contains_key(&function_name)
        {
            return Err(RuntimeException::new(format!(
                "cannot attach undefined function '{}' as method '{}'",
                function_name, method_name
            )));
        }

        let prototype = self.fetch(target)?;
        let mut prototype = prototype.borrow_mut();
        match &mut *prototype {
            Value::Prototype(proto) => proto.attach(function_name, method_name),
            other => {
                return Err(RuntimeException::type_error(format!(
                    "expected Prototype, got {}",
                    other.type_name()
                )))
            }
        }
        Ok(next)
    }

    /// Install the prototype from a register into the typesystem
    pub(super) fn op_register(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let source = reader.read_reg()?;
        let next = reader.position();

        let source = self.resolve(source)?;
        let prototype = {
            let value = self.fetch(source)?;
            let value = value.borrow();
            match &*value {
                Value::Prototype(proto) => proto.clone(),
                other => {
                    return Err(RuntimeException::type_error(format!(
                        "expected Prototype, got {}",
                        other.type_name()
                    )))
                }
            }
        };
        self.uregset()?.empty(source)?;
        self.typesystem.insert(prototype.name.clone(), prototype);
        Ok(next)
    }

    /// Instantiate a registered class
    pub(super) fn op_new(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let target = reader.read_reg()?;
        let class_name = reader.read_cstr()?;
        let next = reader.position();

        let target = self.resolve(target)?;
        if !self.typesystem.contains_key(&class_name) {
            return Err(RuntimeException::new(format!(
                "cannot create new instance of unregistered type: {}",
                class_name
            )));
        }
        self.place(target, Value::Object { class_name })?;
        Ok(next)
    }

    /// Dispatch a method on the receiver staged as argument 0
    ///
    /// The receiver's inheritance chain is walked depth-first,
    /// left-to-right; the first prototype carrying the method wins.
    /// Pure-native types fall back to the foreign method registry,
    /// keyed `Type::method`.
    pub(super) fn op_msg(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let return_register = reader.read_reg()?;
        let method_name = reader.read_cstr()?;
        let return_address = reader.position();

        let receiver = {
            let frame = self.frame_new.as_ref().ok_or_else(|| {
                RuntimeException::bad_frame("message dispatched without a frame")
            })?;
            if frame.args.size() == 0 {
                return Err(RuntimeException::bad_frame(
                    "message dispatched without a receiver",
                ));
            }
            frame.args.get(0)?
        };

        let chain = self.chain_of(&receiver);
        for type_name in &chain {
            if let Some(function_name) = self
                .typesystem
                .get(type_name)
                .and_then(|proto| proto.methods.get(&method_name))
            {
                let function_name = function_name.clone();
                return self.invoke(&function_name, return_register, return_address, Vec::new());
            }
        }

        for type_name in &chain {
            let key = format!("{}::{}", type_name, method_name);
            if let Some(&method) = self.foreign_methods.get(&key) {
                let mut frame = self.take_pending_frame()?;
                frame.function_name = key;
                frame.return_address = return_address;
                frame.place_return_value_in = return_register.index;
                frame.resolve_return_value_register = return_register.by_reference;
                self.push_frame(frame)?;

                let callee = self.frames.last_mut().expect("frame pushed above");
                method(&receiver, callee)?;
                self.finish_call()?;
                return Ok(return_address);
            }
        }

        Err(RuntimeException::new(format!(
            "unresolved method call: {} on {}",
            method_name,
            chain.first().map(String::as_str).unwrap_or("unknown")
        )))
    }
}
