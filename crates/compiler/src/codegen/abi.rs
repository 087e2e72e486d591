//! Calling-convention parameter placement (spec.md §4.6 "AMD64 calling
//! conventions"): Windows x64 and System-V AMD64 differ in which
//! registers carry the first arguments, how much shadow space a call
//! reserves, and the threshold past which a struct argument is passed
//! by address rather than by value.

use crate::config::Target;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    Rbp,
    Rsp,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    Xmm(u8),
}

impl Reg {
    pub fn name64(self) -> String {
        match self {
            Reg::Rax => "rax".into(),
            Reg::Rbx => "rbx".into(),
            Reg::Rcx => "rcx".into(),
            Reg::Rdx => "rdx".into(),
            Reg::Rsi => "rsi".into(),
            Reg::Rdi => "rdi".into(),
            Reg::Rbp => "rbp".into(),
            Reg::Rsp => "rsp".into(),
            Reg::R8 => "r8".into(),
            Reg::R9 => "r9".into(),
            Reg::R10 => "r10".into(),
            Reg::R11 => "r11".into(),
            Reg::R12 => "r12".into(),
            Reg::R13 => "r13".into(),
            Reg::R14 => "r14".into(),
            Reg::R15 => "r15".into(),
            Reg::Xmm(n) => format!("xmm{n}"),
        }
    }

    pub fn is_xmm(self) -> bool {
        matches!(self, Reg::Xmm(_))
    }

    /// Callee-saved registers that a routine using them must preserve
    /// across calls (spec §4.6). Windows reserves rdi/rsi for the
    /// callee's use (its first four integer arguments go through
    /// rcx/rdx/r8/r9 instead), so they join the callee-saved set there;
    /// System-V spends rdi/rsi on argument passing and leaves them
    /// caller-saved.
    pub fn is_callee_saved(self, target: Target) -> bool {
        match target {
            Target::Amd64Windows => matches!(
                self,
                Reg::Rbx | Reg::Rbp | Reg::Rdi | Reg::Rsi | Reg::R12 | Reg::R13 | Reg::R14 | Reg::R15
            ),
            Target::Amd64Unix => matches!(
                self,
                Reg::Rbx | Reg::Rbp | Reg::R12 | Reg::R13 | Reg::R14 | Reg::R15
            ),
        }
    }
}

/// Integer argument registers, in order, for `target`.
pub fn integer_arg_registers(target: Target) -> &'static [Reg] {
    match target {
        Target::Amd64Windows => &[Reg::Rcx, Reg::Rdx, Reg::R8, Reg::R9],
        Target::Amd64Unix => &[Reg::Rdi, Reg::Rsi, Reg::Rdx, Reg::Rcx, Reg::R8, Reg::R9],
    }
}

/// Float/double argument registers, in order, for `target`.
pub fn float_arg_registers(target: Target) -> &'static [u8] {
    match target {
        Target::Amd64Windows => &[0, 1, 2, 3],
        Target::Amd64Unix => &[0, 1, 2, 3, 4, 5, 6, 7],
    }
}

/// Bytes of shadow space the caller reserves below the return address
/// before every call on Windows x64, even when the callee takes fewer
/// than 4 register arguments (spec §4.6 "shadow space"). System-V has
/// no equivalent.
pub fn shadow_space_bytes(target: Target) -> i64 {
    match target {
        Target::Amd64Windows => 32,
        Target::Amd64Unix => 0,
    }
}

/// A struct argument larger than this many bytes is passed by address
/// (the caller copies it to a temporary and passes a pointer) rather
/// than packed into registers/stack slots, uniformly for both ABIs
/// (spec §4.6, resolved Open Question — see DESIGN.md).
pub const STRUCT_BY_ADDRESS_THRESHOLD: u64 = 8;

/// `rsp` must be 16-byte aligned immediately before a `call`
/// instruction executes (spec §4.6 "stack alignment"); since `call`
/// itself pushes an 8-byte return address, the prologue must leave
/// `rsp % 16 == 0` right before that push.
pub fn align_to_16(bytes: i64) -> i64 {
    (bytes + 15) & !15
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_and_unix_disagree_on_first_integer_register() {
        assert_eq!(integer_arg_registers(Target::Amd64Windows)[0], Reg::Rcx);
        assert_eq!(integer_arg_registers(Target::Amd64Unix)[0], Reg::Rdi);
    }

    #[test]
    fn only_windows_reserves_shadow_space() {
        assert_eq!(shadow_space_bytes(Target::Amd64Windows), 32);
        assert_eq!(shadow_space_bytes(Target::Amd64Unix), 0);
    }

    #[test]
    fn align_to_16_rounds_up() {
        assert_eq!(align_to_16(0), 0);
        assert_eq!(align_to_16(1), 16);
        assert_eq!(align_to_16(17), 32);
    }
}
