use ndx_index::{AnnotationStub, ClassStub, FieldStub, MethodStub, TypeSignatureStub};

use crate::error::{BoxError, BridgeError};

/// Turns raw class-file bytes into class facts. Parsing lives with the caller.
pub trait ClassDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<ClassStub, BoxError>;
}

impl<F> ClassDecoder for F
where
    F: Fn(&[u8]) -> Result<ClassStub, BoxError>,
{
    fn decode(&self, bytes: &[u8]) -> Result<ClassStub, BoxError> {
        self(bytes)
    }
}

/// Read operations shared by decoded classes and index-backed types.
pub trait BinaryTypeView {
    fn descriptor(&self) -> Result<String, BridgeError>;
    fn access_flags(&self) -> Result<u32, BridgeError>;
    fn generic_signature(&self) -> Result<Option<String>, BridgeError>;
    fn source_file(&self) -> Result<Option<String>, BridgeError>;
    fn enclosing_type(&self) -> Result<Option<String>, BridgeError>;
    fn superclass(&self) -> Result<Option<TypeSignatureStub>, BridgeError>;
    fn interfaces(&self) -> Result<Vec<TypeSignatureStub>, BridgeError>;
    fn methods(&self) -> Result<Vec<MethodStub>, BridgeError>;
    fn fields(&self) -> Result<Vec<FieldStub>, BridgeError>;
    fn annotations(&self) -> Result<Vec<AnnotationStub>, BridgeError>;

    /// Everything at once.
    fn to_stub(&self) -> Result<ClassStub, BridgeError>;
}

impl BinaryTypeView for ClassStub {
    fn descriptor(&self) -> Result<String, BridgeError> {
        Ok(self.descriptor.clone())
    }

    fn access_flags(&self) -> Result<u32, BridgeError> {
        Ok(self.access_flags)
    }

    fn generic_signature(&self) -> Result<Option<String>, BridgeError> {
        Ok(self.generic_signature.clone())
    }

    fn source_file(&self) -> Result<Option<String>, BridgeError> {
        Ok(self.source_file.clone())
    }

    fn enclosing_type(&self) -> Result<Option<String>, BridgeError> {
        Ok(self.enclosing_type.clone())
    }

    fn superclass(&self) -> Result<Option<TypeSignatureStub>, BridgeError> {
        Ok(self.superclass.clone())
    }

    fn interfaces(&self) -> Result<Vec<TypeSignatureStub>, BridgeError> {
        Ok(self.interfaces.clone())
    }

    fn methods(&self) -> Result<Vec<MethodStub>, BridgeError> {
        Ok(self.methods.clone())
    }

    fn fields(&self) -> Result<Vec<FieldStub>, BridgeError> {
        Ok(self.fields.clone())
    }

    fn annotations(&self) -> Result<Vec<AnnotationStub>, BridgeError> {
        Ok(self.annotations.clone())
    }

    fn to_stub(&self) -> Result<ClassStub, BridgeError> {
        Ok(self.clone())
    }
}
