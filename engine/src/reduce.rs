use core_types::{DataType, Element};

/// Element-wise `acc += src` for two buffers of the same dtype and length.
pub fn sum_into(dtype: DataType, acc: &mut [u8], src: &[u8]) {
    debug_assert_eq!(acc.len(), src.len());
    match dtype {
        DataType::Float32 => accumulate::<f32>(acc, src),
        DataType::Float64 => accumulate::<f64>(acc, src),
        DataType::Float16 => accumulate::<half::f16>(acc, src),
        DataType::UInt8 | DataType::Byte => accumulate::<u8>(acc, src),
        DataType::Int32 => accumulate::<i32>(acc, src),
        DataType::Int8 => accumulate::<i8>(acc, src),
        DataType::Int64 => accumulate::<i64>(acc, src),
        DataType::UInt16 => accumulate::<u16>(acc, src),
        DataType::Int16 => accumulate::<i16>(acc, src),
        DataType::Bool => {
            for (a, &s) in acc.iter_mut().zip(src) {
                *a = (*a != 0 || s != 0) as u8;
            }
        }
    }
}

fn accumulate<T: Element>(acc: &mut [u8], src: &[u8]) {
    let width = std::mem::size_of::<T>();
    for (a, s) in acc.chunks_exact_mut(width).zip(src.chunks_exact(width)) {
        let sum = T::add(bytemuck::pod_read_unaligned(&*a), bytemuck::pod_read_unaligned(s));
        a.copy_from_slice(bytemuck::bytes_of(&sum));
    }
}
