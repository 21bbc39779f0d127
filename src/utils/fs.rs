//! IO helper: safe file read/write for JSON

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::model::data_core::AppError;

/// 从文件读取JSON数据
pub fn read_json_file(p: &Path) -> Result<Value, AppError> {
    read_json_as(p)
}

/// 从文件读取并反序列化为指定类型
///
/// 标签键控的树每层占三层 JSON 嵌套，默认 128 层上限只够约 42 层树，因此关闭递归上限。
pub fn read_json_as<T: DeserializeOwned>(p: &Path) -> Result<T, AppError> {
    let f = File::open(p)?;
    let mut de = serde_json::Deserializer::from_reader(BufReader::new(f));
    de.disable_recursion_limit();
    let value = T::deserialize(&mut de)?;
    de.end()?;
    Ok(value)
}

/// 将JSON数据保存到文件（格式化输出，便于 diff）
pub fn write_json_file<T: Serialize + ?Sized>(p: &Path, value: &T) -> Result<(), AppError> {
    let f = File::create(p)?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer_pretty(&mut w, value)?;
    w.flush()?;
    Ok(())
}
