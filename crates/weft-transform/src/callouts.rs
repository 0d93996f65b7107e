//! Coordinator call-out references
//!
//! Every injected call site binds to the coordinator owner class through
//! these builders, so the wire names and descriptors live in one place.

use weft_classfile::{MethodRef, TypeTag};
use weft_policy::names;

fn callout(name: &str, desc: &str) -> MethodRef {
    MethodRef::new(names::COORDINATOR_OWNER, name, desc)
}

pub fn is_managed() -> MethodRef {
    callout("isManaged", "(Ljava/lang/Object;)Z")
}

pub fn is_recognized() -> MethodRef {
    callout("isRecognized", "(Ljava/lang/Object;)Z")
}

pub fn begin_lock() -> MethodRef {
    callout("beginLock", "(Ljava/lang/String;I)V")
}

pub fn commit_lock() -> MethodRef {
    callout("commitLock", "(Ljava/lang/String;)V")
}

pub fn monitor_enter() -> MethodRef {
    callout("monitorEnter", "(Ljava/lang/Object;I)V")
}

pub fn monitor_exit() -> MethodRef {
    callout("monitorExit", "(Ljava/lang/Object;)V")
}

/// Kind-specific change notification: owner name, field name, new value,
/// array index or `-1`. Reference kinds normalize to the object variant.
pub fn field_changed(field_desc: &str) -> MethodRef {
    let value = match TypeTag::parse(field_desc) {
        Ok(tag) if tag.is_reference() => "Ljava/lang/Object;".to_string(),
        Ok(tag) => tag.descriptor(),
        Err(_) => "Ljava/lang/Object;".to_string(),
    };
    callout(
        "fieldChanged",
        &format!("(Ljava/lang/String;Ljava/lang/String;{}I)V", value),
    )
}

pub fn logical_invoke() -> MethodRef {
    callout(
        "logicalInvoke",
        "(Ljava/lang/Object;Ljava/lang/String;[Ljava/lang/Object;)V",
    )
}

pub fn check_write_access() -> MethodRef {
    callout("checkWriteAccess", "(Ljava/lang/Object;)V")
}

pub fn resolve_reference() -> MethodRef {
    callout("resolveReference", "(Ljava/lang/Object;Ljava/lang/String;)V")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_changed_normalizes_references() {
        assert_eq!(
            field_changed("Ljava/util/Map;").desc,
            "(Ljava/lang/String;Ljava/lang/String;Ljava/lang/Object;I)V"
        );
        assert_eq!(
            field_changed("J").desc,
            "(Ljava/lang/String;Ljava/lang/String;JI)V"
        );
    }

    #[test]
    fn callouts_bind_to_coordinator_owner() {
        assert_eq!(is_managed().owner, names::COORDINATOR_OWNER);
        assert_eq!(begin_lock().owner, names::COORDINATOR_OWNER);
    }
}
