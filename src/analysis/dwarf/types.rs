//! Type-name resolution for variables.

use gimli::{constants, AttributeValue, DwAte, Unit, UnitOffset};

use super::Reader;

/// Depth limit for type chains (guards against reference cycles)
const MAX_TYPE_DEPTH: u32 = 16;

/// What the debugger needs to know about a variable's type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    /// C spelling, `<unknown>` when it cannot be resolved
    pub name: String,
    /// Size in bytes, 0 when unknown
    pub byte_size: u32,
    pub is_signed: bool,
    /// Struct, union, class or array; not readable as a scalar
    pub is_aggregate: bool,
}

impl TypeInfo {
    pub fn unknown() -> Self {
        Self {
            name: "<unknown>".to_string(),
            byte_size: 0,
            is_signed: false,
            is_aggregate: false,
        }
    }

    fn named(name: impl Into<String>, byte_size: u32, is_signed: bool) -> Self {
        Self {
            name: name.into(),
            byte_size,
            is_signed,
            is_aggregate: false,
        }
    }
}

/// Conventional C spelling of a base type
pub fn base_type_name(encoding: DwAte, byte_size: u32) -> Option<String> {
    let name = match encoding {
        constants::DW_ATE_signed => match byte_size {
            1 => "char".to_string(),
            2 => "short".to_string(),
            4 => "int".to_string(),
            8 => "long long".to_string(),
            n => format!("int{}_t", n * 8),
        },
        constants::DW_ATE_signed_char => "char".to_string(),
        constants::DW_ATE_unsigned => match byte_size {
            1 => "unsigned char".to_string(),
            2 => "unsigned short".to_string(),
            4 => "unsigned int".to_string(),
            8 => "unsigned long long".to_string(),
            n => format!("uint{}_t", n * 8),
        },
        constants::DW_ATE_unsigned_char => "unsigned char".to_string(),
        constants::DW_ATE_float => match byte_size {
            8 => "double".to_string(),
            16 => "long double".to_string(),
            _ => "float".to_string(),
        },
        constants::DW_ATE_boolean => "bool".to_string(),
        _ => return None,
    };
    Some(name)
}

fn is_signed_encoding(encoding: DwAte) -> bool {
    matches!(encoding, constants::DW_ATE_signed | constants::DW_ATE_signed_char)
}

/// Resolves type references inside one compilation unit
pub(super) struct TypeResolver<'a, 'd> {
    pub dwarf: &'a gimli::Dwarf<Reader<'d>>,
    pub unit: &'a Unit<Reader<'d>>,
}

impl<'a, 'd> TypeResolver<'a, 'd> {
    /// Resolve the type referenced by a `DW_AT_type` attribute value
    pub fn resolve_attr(&self, value: Option<AttributeValue<Reader<'d>>>) -> TypeInfo {
        match value {
            Some(AttributeValue::UnitRef(offset)) => self.resolve(offset, 0),
            _ => TypeInfo::unknown(),
        }
    }

    fn resolve(&self, offset: UnitOffset, depth: u32) -> TypeInfo {
        if depth > MAX_TYPE_DEPTH {
            return TypeInfo::unknown();
        }
        let entry = match self.unit.entry(offset) {
            Ok(entry) => entry,
            Err(e) => {
                log::debug!("Unresolvable type reference {:?}: {}", offset, e);
                return TypeInfo::unknown();
            }
        };

        let name = entry
            .attr_value(constants::DW_AT_name)
            .ok()
            .flatten()
            .and_then(|v| self.dwarf.attr_string(self.unit, v).ok())
            .map(|s| s.to_string_lossy().into_owned());
        let byte_size = entry
            .attr_value(constants::DW_AT_byte_size)
            .ok()
            .flatten()
            .and_then(|v| v.udata_value())
            .unwrap_or(0) as u32;
        let inner = || match entry.attr_value(constants::DW_AT_type) {
            Ok(Some(AttributeValue::UnitRef(inner))) => Some(self.resolve(inner, depth + 1)),
            _ => None,
        };

        match entry.tag() {
            constants::DW_TAG_base_type => {
                let encoding = match entry.attr_value(constants::DW_AT_encoding) {
                    Ok(Some(AttributeValue::Encoding(encoding))) => Some(encoding),
                    _ => None,
                };
                let spelled = encoding.and_then(|e| base_type_name(e, byte_size));
                match spelled.or(name) {
                    Some(spelled) => TypeInfo::named(
                        spelled,
                        byte_size,
                        encoding.map(is_signed_encoding).unwrap_or(false),
                    ),
                    None => TypeInfo::unknown(),
                }
            }
            constants::DW_TAG_pointer_type => {
                let size = if byte_size != 0 {
                    byte_size
                } else {
                    self.unit.header.address_size() as u32
                };
                let spelled = match inner() {
                    Some(target) => format!("{}*", target.name),
                    None => "void*".to_string(),
                };
                TypeInfo::named(spelled, size, false)
            }
            constants::DW_TAG_const_type | constants::DW_TAG_volatile_type => {
                let qualifier = if entry.tag() == constants::DW_TAG_const_type {
                    "const"
                } else {
                    "volatile"
                };
                match inner() {
                    Some(target) => TypeInfo {
                        name: format!("{} {}", qualifier, target.name),
                        ..target
                    },
                    None => TypeInfo::named(format!("{} void", qualifier), 0, false),
                }
            }
            constants::DW_TAG_typedef => {
                let target = inner().unwrap_or_else(TypeInfo::unknown);
                TypeInfo {
                    name: name.unwrap_or(target.name.clone()),
                    ..target
                }
            }
            constants::DW_TAG_enumeration_type => {
                TypeInfo::named(name.unwrap_or_else(|| "<anonymous>".to_string()), byte_size, false)
            }
            constants::DW_TAG_structure_type
            | constants::DW_TAG_union_type
            | constants::DW_TAG_class_type => TypeInfo {
                name: name.unwrap_or_else(|| "<anonymous>".to_string()),
                byte_size,
                is_signed: false,
                is_aggregate: true,
            },
            constants::DW_TAG_array_type => {
                let element = inner().unwrap_or_else(TypeInfo::unknown);
                TypeInfo {
                    name: format!("{}[]", element.name),
                    byte_size,
                    is_signed: false,
                    is_aggregate: true,
                }
            }
            _ => match name {
                Some(name) => TypeInfo::named(name, byte_size, false),
                None => TypeInfo::unknown(),
            },
        }
    }
}
