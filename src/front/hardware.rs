//! The fixed hardware vocabulary every Penguin program is compiled against:
//! display memory, object attribute memory, input flags, and the control
//! procedures. Grounded on `predefinedVnF.py::initialize_hardware_elements`.

use crate::common::Id;
use crate::front::types::Type;

/// A hardware procedure's signature: parameter types (always empty for the
/// vocabulary this language exposes) and return type.
pub struct ProcSig {
    pub params: Vec<Type>,
    pub ret: Type,
}

/// The hardware scalar/list symbols, as (name, type) pairs.
pub fn hardware_symbols() -> Vec<(&'static str, Type)> {
    vec![
        ("display_tileset_block_0", Type::Tileset),
        ("display_tileset_block_1", Type::Tileset),
        ("display_tileset_block_2", Type::Tileset),
        ("display_tilemap0", Type::Tilemap),
        ("display_oam_x", Type::ListInt),
        ("display_oam_y", Type::ListInt),
        ("display_oam_tile", Type::ListInt),
        ("display_oam_attr", Type::ListInt),
        ("input_Right", Type::Int),
        ("input_Left", Type::Int),
        ("input_Up", Type::Int),
        ("input_Down", Type::Int),
        ("input_A", Type::Int),
        ("input_B", Type::Int),
        ("input_Start", Type::Int),
        ("input_Select", Type::Int),
    ]
}

/// The hardware procedure table, keyed by the already-flattened
/// `module_fn` name.
pub fn hardware_procedures() -> Vec<(&'static str, ProcSig)> {
    let void = |name| (name, ProcSig { params: vec![], ret: Type::Void });
    let int_fn = |name| (name, ProcSig { params: vec![], ret: Type::Int });
    vec![
        void("control_LCDon"),
        void("control_LCDoff"),
        void("control_waitVBlank"),
        void("control_updateInput"),
        void("control_initDisplayRegs"),
        void("control_initPalette"),
        int_fn("control_checkLeft"),
        int_fn("control_checkRight"),
        int_fn("control_checkUp"),
        int_fn("control_checkDown"),
        int_fn("control_checkA"),
        int_fn("control_checkB"),
        int_fn("control_checkStart"),
        int_fn("control_checkSelect"),
    ]
}

/// Is `name` one of the hardware symbols (as opposed to a user global)?
pub fn is_hardware_symbol(name: &str) -> bool {
    hardware_symbols().iter().any(|(n, _)| *n == name)
}

/// Is `name` one of the four OAM attribute lists (which stride by four
/// bytes per indexed access, unlike the tileset/tilemap byte arrays)?
pub fn is_oam_list(name: &str) -> bool {
    matches!(
        name,
        "display_oam_x" | "display_oam_y" | "display_oam_tile" | "display_oam_attr"
    )
}

pub fn canonical_id(name: &str) -> Id {
    Id::from(name.to_string())
}
