//! Size vectors: known clear and encrypted lengths for every format.
//!
//! Clients on other platforms compute the same sizes to allocate buffers and
//! report progress, so these values must never change.

use trustcore_protect::{EncryptionFormat, EncryptionFormatDescription};

/// A size test vector.
#[derive(Debug, Clone)]
pub struct SizeVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub version: u8,
    /// Only for the streaming format.
    pub encrypted_chunk_size: Option<u32>,
    pub clear_size: u64,
    pub encrypted_size: u64,
}

impl SizeVector {
    pub fn description(&self) -> EncryptionFormatDescription {
        EncryptionFormatDescription {
            version: self.version,
            encrypted_chunk_size: self.encrypted_chunk_size,
        }
    }
}

const MIB: u32 = 1024 * 1024;

/// Get all size vectors.
pub fn all_vectors() -> Vec<SizeVector> {
    vec![
        SizeVector {
            name: "v1 empty",
            version: 1,
            encrypted_chunk_size: None,
            clear_size: 0,
            encrypted_size: 41,
        },
        SizeVector {
            name: "v2 ten bytes",
            version: 2,
            encrypted_chunk_size: None,
            clear_size: 10,
            encrypted_size: 51,
        },
        SizeVector {
            name: "v3 ten bytes",
            version: 3,
            encrypted_chunk_size: None,
            clear_size: 10,
            encrypted_size: 27,
        },
        SizeVector {
            name: "v5 ten bytes",
            version: 5,
            encrypted_chunk_size: None,
            clear_size: 10,
            encrypted_size: 67,
        },
        SizeVector {
            name: "v4 empty stream is one empty chunk",
            version: 4,
            encrypted_chunk_size: Some(MIB),
            clear_size: 0,
            encrypted_size: 61,
        },
        SizeVector {
            name: "v4 one byte",
            version: 4,
            encrypted_chunk_size: Some(MIB),
            clear_size: 1,
            encrypted_size: 62,
        },
        SizeVector {
            name: "v4 one full chunk needs a trailing empty chunk",
            version: 4,
            encrypted_chunk_size: Some(MIB),
            clear_size: (MIB - 61) as u64,
            encrypted_size: MIB as u64 + 61,
        },
        SizeVector {
            name: "v4 two full chunks",
            version: 4,
            encrypted_chunk_size: Some(100),
            clear_size: 78,
            encrypted_size: 261,
        },
        SizeVector {
            name: "v4 small chunks with a partial last chunk",
            version: 4,
            encrypted_chunk_size: Some(100),
            clear_size: 100,
            encrypted_size: 283,
        },
    ]
}

/// Check a vector in both directions.
pub fn verify_vector(vector: &SizeVector) -> Result<(), String> {
    let description = vector.description();
    let encrypted = trustcore_protect::get_encrypted_size(&description, vector.clear_size)
        .map_err(|e| format!("{}: {}", vector.name, e))?;
    if encrypted != vector.encrypted_size {
        return Err(format!(
            "{}: encrypted size {} != expected {}",
            vector.name, encrypted, vector.encrypted_size
        ));
    }
    let clear = trustcore_protect::get_clear_size(&description, vector.encrypted_size)
        .map_err(|e| format!("{}: {}", vector.name, e))?;
    if clear != vector.clear_size {
        return Err(format!(
            "{}: clear size {} != expected {}",
            vector.name, clear, vector.clear_size
        ));
    }
    Ok(())
}

/// Verify all vectors, collecting every failure.
pub fn verify_all_vectors() -> Result<(), Vec<String>> {
    let errors: Vec<String> = all_vectors()
        .iter()
        .filter_map(|v| verify_vector(v).err())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Format matching a vector, for encrypting real data.
pub fn vector_format(vector: &SizeVector) -> EncryptionFormat {
    match vector.version {
        1 => EncryptionFormat::V1,
        2 => EncryptionFormat::V2,
        3 => EncryptionFormat::V3,
        4 => EncryptionFormat::V4,
        _ => EncryptionFormat::V5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustcore_protect::format::v4;
    use trustcore_protect::make_resource;

    #[test]
    fn test_all_vectors_hold() {
        verify_all_vectors().unwrap();
    }

    #[test]
    fn test_vectors_match_real_ciphertexts() {
        let resource = make_resource();
        for vector in all_vectors() {
            let clear = vec![0x5a; vector.clear_size as usize];
            let encrypted = match vector.encrypted_chunk_size {
                Some(chunk) => v4::encrypt(&resource.key, &resource.resource_id, &clear, chunk).unwrap(),
                None => vector_format(&vector)
                    .encrypt(&resource.key, &resource.resource_id, &clear)
                    .unwrap(),
            };
            assert_eq!(encrypted.len() as u64, vector.encrypted_size, "{}", vector.name);
        }
    }
}
