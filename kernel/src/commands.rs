//! Shell command policy
//!
//! The registry primitives accept any process. Commands typed at the shell
//! go through [`ShellCommands`] instead, which refuses to suspend, resume,
//! reprioritize or delete System processes.

use ember_drivers::Hardware;
use thiserror::Error;

use crate::kernel::Kernel;
use crate::objects::{ProcessClass, ProcessId};
use crate::scheduler::{ProcessInfo, QueueKind, RegistryError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("user cannot update system process '{0}'")]
    SystemProcess(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub type Result<T> = core::result::Result<T, CommandError>;

/// Shell-facing view of a kernel
pub struct ShellCommands<'a, H: Hardware> {
    kernel: &'a mut Kernel<H>,
}

impl<'a, H: Hardware> ShellCommands<'a, H> {
    pub fn new(kernel: &'a mut Kernel<H>) -> Self {
        Self { kernel }
    }

    /// Reject System processes; unknown names pass through so the registry
    /// reports them.
    fn guard(&self, name: &str) -> Result<()> {
        match self.kernel.registry().is_system(name) {
            Some(true) => {
                log::warn!("[kernel] shell refused to modify system process '{}'", name);
                Err(CommandError::SystemProcess(name.to_string()))
            }
            _ => Ok(()),
        }
    }

    pub fn create(&mut self, name: &str, class: ProcessClass, priority: u8) -> Result<ProcessId> {
        Ok(self.kernel.create(name, class, priority)?)
    }

    pub fn delete(&mut self, name: &str) -> Result<ProcessId> {
        self.guard(name)?;
        Ok(self.kernel.delete(name)?)
    }

    pub fn block(&mut self, name: &str) -> Result<bool> {
        Ok(self.kernel.block(name)?)
    }

    pub fn unblock(&mut self, name: &str) -> Result<bool> {
        Ok(self.kernel.unblock(name)?)
    }

    pub fn suspend(&mut self, name: &str) -> Result<bool> {
        self.guard(name)?;
        Ok(self.kernel.suspend(name))
    }

    pub fn resume(&mut self, name: &str) -> Result<bool> {
        self.guard(name)?;
        Ok(self.kernel.resume(name))
    }

    pub fn set_priority(&mut self, name: &str, priority: u8) -> Result<()> {
        self.guard(name)?;
        Ok(self.kernel.set_priority(name, priority)?)
    }

    pub fn resume_all(&mut self) -> usize {
        self.kernel.resume_all()
    }

    pub fn find(&self, name: &str) -> Option<QueueKind> {
        self.kernel.find(name)
    }

    pub fn show(&self, name: &str) -> Option<ProcessInfo> {
        self.kernel.show(name)
    }

    pub fn show_ready(&self) -> Vec<ProcessInfo> {
        self.kernel.registry().show_ready()
    }

    pub fn show_blocked(&self) -> Vec<ProcessInfo> {
        self.kernel.registry().show_blocked()
    }

    pub fn show_all(&self) -> Vec<ProcessInfo> {
        self.kernel.registry().show_all()
    }

    /// Ask the kernel to return to its boot context.
    pub fn shutdown(&mut self) {
        self.kernel.request_shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::scheduler::QueueKind;
    use ember_drivers::serial::COM1;
    use ember_drivers::LoopbackUart;

    fn kernel() -> Kernel<LoopbackUart> {
        Kernel::boot(KernelConfig::default(), LoopbackUart::new(COM1)).unwrap()
    }

    #[test]
    fn test_system_processes_are_protected() {
        let mut kernel = kernel();
        let mut shell = ShellCommands::new(&mut kernel);

        assert_eq!(shell.suspend("idle"), Err(CommandError::SystemProcess("idle".into())));
        assert_eq!(shell.resume("idle"), Err(CommandError::SystemProcess("idle".into())));
        assert_eq!(shell.set_priority("idle", 9), Err(CommandError::SystemProcess("idle".into())));
        assert_eq!(shell.delete("idle"), Err(CommandError::SystemProcess("idle".into())));
        assert_eq!(kernel.find("idle"), Some(QueueKind::Ready));

        // The primitive itself does not care
        assert!(kernel.suspend("idle"));
    }

    #[test]
    fn test_user_processes_pass_through() {
        let mut kernel = kernel();
        let mut shell = ShellCommands::new(&mut kernel);

        shell.create("editor", ProcessClass::User, 4).unwrap();
        assert_eq!(shell.suspend("editor"), Ok(true));
        assert_eq!(shell.resume("editor"), Ok(true));
        shell.set_priority("editor", 8).unwrap();
        assert_eq!(shell.show("editor").map(|info| info.priority), Some(8));
        assert_eq!(shell.show_ready()[0].name, "editor");
        shell.delete("editor").unwrap();
        assert!(shell.show("editor").is_none());
    }

    #[test]
    fn test_registry_errors_surface() {
        let mut kernel = kernel();
        let mut shell = ShellCommands::new(&mut kernel);

        assert_eq!(
            shell.delete("ghost"),
            Err(CommandError::Registry(RegistryError::NotFound("ghost".into())))
        );
        assert_eq!(shell.suspend("ghost"), Ok(false));
        assert_eq!(
            shell.create("idle", ProcessClass::User, 1),
            Err(CommandError::Registry(RegistryError::DuplicateName("idle".into())))
        );
    }

    #[test]
    fn test_shutdown_request() {
        let mut kernel = kernel();
        ShellCommands::new(&mut kernel).shutdown();
        assert!(kernel.shutdown_requested());
    }
}
