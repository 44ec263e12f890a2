//! # Descriptor Tables
//!
//! The bootloader leaves us in long mode on its own GDT. We replace it with
//! a flat one we own: null, kernel code, kernel data, then the TSS whose
//! interrupt stack table gives the double-fault handler a known-good stack.

use core::cell::UnsafeCell;
use spin::Lazy;
use x86_64::instructions::segmentation::{Segment, CS, DS, ES, SS};
use x86_64::instructions::tables::load_tss;
use x86_64::structures::gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector};
use x86_64::structures::tss::TaskStateSegment;
use x86_64::VirtAddr;

pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;

const IST_STACK_SIZE: usize = 4096 * 5;

/// Stack the CPU switches to on its own. Nothing in Rust ever reads or
/// writes it, so it is shared as a plain address.
#[repr(C, align(16))]
struct IstStack(UnsafeCell<[u8; IST_STACK_SIZE]>);

unsafe impl Sync for IstStack {}

impl IstStack {
    const fn new() -> Self {
        Self(UnsafeCell::new([0; IST_STACK_SIZE]))
    }

    fn base(&self) -> VirtAddr {
        VirtAddr::from_ptr(self.0.get())
    }

    /// Stacks grow down, so the IST slot holds one past the last byte.
    fn top(&self) -> VirtAddr {
        self.base() + IST_STACK_SIZE as u64
    }
}

static DOUBLE_FAULT_STACK: IstStack = IstStack::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selectors {
    pub code: SegmentSelector,
    pub data: SegmentSelector,
    pub tss: SegmentSelector,
}

fn build_tss(double_fault: &IstStack) -> TaskStateSegment {
    let mut tss = TaskStateSegment::new();
    tss.interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize] = double_fault.top();
    tss
}

fn build_table(tss: &'static TaskStateSegment) -> (GlobalDescriptorTable, Selectors) {
    let mut table = GlobalDescriptorTable::new();
    let selectors = Selectors {
        code: table.append(Descriptor::kernel_code_segment()),
        data: table.append(Descriptor::kernel_data_segment()),
        tss: table.append(Descriptor::tss_segment(tss)),
    };
    (table, selectors)
}

static TSS: Lazy<TaskStateSegment> = Lazy::new(|| build_tss(&DOUBLE_FAULT_STACK));

static GDT: Lazy<(GlobalDescriptorTable, Selectors)> = Lazy::new(|| build_table(&TSS));

pub fn selectors() -> Selectors {
    GDT.1
}

/// Load the table, point CS and the data segment registers at it, then
/// load the task register.
pub(crate) fn load() {
    let (table, selectors) = &*GDT;
    table.load();

    unsafe {
        CS::set_reg(selectors.code);
        DS::set_reg(selectors.data);
        ES::set_reg(selectors.data);
        SS::set_reg(selectors.data);
        load_tss(selectors.tss);
    }
}
