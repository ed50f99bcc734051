//! # Portfolio Data
//!
//! $$
//! r_t = \frac{p_t}{p_{t-1}} - 1,\qquad
//! \hat\mu = K\,\bar r,\qquad \hat\Sigma = K\,\widehat{\operatorname{Cov}}(r)
//! $$
//!
//! Price tables, return series and annualized asset statistics.

use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use ndarray_stats::CorrelationExt;
use ndarray_stats::QuantileExt;
use tracing::debug;
use tracing::warn;

use super::error::PortfolioError;
use super::error::Result;

/// Trading periods per year for daily closes.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Closing prices, one column per ticker, rows aligned on a common date index.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceTable {
  tickers: Vec<String>,
  dates: Vec<NaiveDate>,
  prices: Array2<f64>,
}

impl PriceTable {
  /// Build a table from already-clean prices (`rows = dates`, `cols = tickers`).
  ///
  /// Every price must be finite and strictly positive and dates must be
  /// strictly increasing.
  pub fn new(tickers: Vec<String>, dates: Vec<NaiveDate>, prices: Array2<f64>) -> Result<Self> {
    if tickers.is_empty() {
      return Err(PortfolioError::InvalidInput(
        "price table needs at least one asset column".to_string(),
      ));
    }
    if prices.ncols() != tickers.len() {
      return Err(PortfolioError::DimensionMismatch {
        expected: tickers.len(),
        actual: prices.ncols(),
      });
    }
    if prices.nrows() != dates.len() {
      return Err(PortfolioError::DimensionMismatch {
        expected: dates.len(),
        actual: prices.nrows(),
      });
    }
    for (i, ticker) in tickers.iter().enumerate() {
      if tickers[..i].contains(ticker) {
        return Err(PortfolioError::InvalidInput(format!(
          "duplicate ticker column {ticker}"
        )));
      }
    }
    if dates.windows(2).any(|w| w[0] >= w[1]) {
      return Err(PortfolioError::InvalidInput(
        "dates must be strictly increasing".to_string(),
      ));
    }
    if let Some(((row, col), p)) = prices
      .indexed_iter()
      .find(|(_, p)| !(p.is_finite() && **p > 0.0))
    {
      return Err(PortfolioError::InvalidInput(format!(
        "price of {} on {} must be finite and positive, got {p}",
        tickers[col], dates[row]
      )));
    }

    Ok(Self {
      tickers,
      dates,
      prices,
    })
  }

  /// Build a table from raw per-ticker columns that may contain gaps.
  ///
  /// Tickers without a single observation are dropped, then every date on
  /// which any remaining ticker is missing. `NaN` counts as missing.
  pub fn from_columns(
    dates: Vec<NaiveDate>,
    columns: Vec<(String, Vec<Option<f64>>)>,
  ) -> Result<Self> {
    fn present(v: &Option<f64>) -> bool {
      matches!(v, Some(p) if !p.is_nan())
    }

    let mut kept = Vec::with_capacity(columns.len());
    for (ticker, values) in columns {
      if values.len() != dates.len() {
        return Err(PortfolioError::DimensionMismatch {
          expected: dates.len(),
          actual: values.len(),
        });
      }
      if !values.iter().any(present) {
        warn!(ticker = %ticker, "dropping ticker with no price data");
        continue;
      }
      kept.push((ticker, values));
    }

    if kept.is_empty() {
      return Err(PortfolioError::InvalidInput(
        "no ticker returned any price data".to_string(),
      ));
    }

    let rows: Vec<usize> = (0..dates.len())
      .filter(|&t| kept.iter().all(|(_, v)| present(&v[t])))
      .collect();
    let dropped = dates.len() - rows.len();
    if dropped > 0 {
      debug!(dropped, "dropping rows with partial price data");
    }

    let prices = Array2::from_shape_fn((rows.len(), kept.len()), |(r, c)| {
      kept[c].1[rows[r]].unwrap_or(f64::NAN)
    });
    let dates = rows.iter().map(|&t| dates[t]).collect();
    let tickers = kept.into_iter().map(|(ticker, _)| ticker).collect();

    Self::new(tickers, dates, prices)
  }

  /// Asset identifiers in column order.
  pub fn tickers(&self) -> &[String] {
    &self.tickers
  }

  /// Date index.
  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  /// Raw price matrix.
  pub fn prices(&self) -> &Array2<f64> {
    &self.prices
  }

  /// Number of observations (rows).
  pub fn len(&self) -> usize {
    self.prices.nrows()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Number of assets (columns).
  pub fn n_assets(&self) -> usize {
    self.tickers.len()
  }

  /// Prices rebased so that the first row equals `base` for every asset.
  pub fn normalized(&self, base: f64) -> Array2<f64> {
    if self.is_empty() {
      return self.prices.clone();
    }
    let first = self.prices.row(0).to_owned();
    &self.prices / &first * base
  }

  /// Period-over-period fractional changes.
  ///
  /// The first row has no predecessor and is dropped; rows with a non-finite
  /// change in any column are excluded.
  pub fn simple_returns(&self) -> Result<ReturnSeries> {
    let n_assets = self.n_assets();
    let mut dates = Vec::with_capacity(self.len().saturating_sub(1));
    let mut values = Vec::with_capacity(self.len().saturating_sub(1) * n_assets);

    for t in 1..self.len() {
      let prev = self.prices.row(t - 1);
      let cur = self.prices.row(t);
      let r: Vec<f64> = cur
        .iter()
        .zip(prev.iter())
        .map(|(c, p)| c / p - 1.0)
        .collect();
      if r.iter().all(|x| x.is_finite()) {
        values.extend(r);
        dates.push(self.dates[t]);
      }
    }

    let values = Array2::from_shape_vec((dates.len(), n_assets), values)
      .map_err(|e| PortfolioError::InvalidInput(e.to_string()))?;

    Ok(ReturnSeries {
      tickers: self.tickers.clone(),
      dates,
      values,
    })
  }
}

/// Simple returns derived from a [`PriceTable`].
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnSeries {
  tickers: Vec<String>,
  dates: Vec<NaiveDate>,
  values: Array2<f64>,
}

impl ReturnSeries {
  pub fn tickers(&self) -> &[String] {
    &self.tickers
  }

  /// Date of the closing price each return ends on.
  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn values(&self) -> &Array2<f64> {
    &self.values
  }

  pub fn len(&self) -> usize {
    self.values.nrows()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// Annualized expected returns and covariance matrix of a set of assets.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetStatistics {
  tickers: Vec<String>,
  mean_returns: Array1<f64>,
  covariance: Array2<f64>,
}

impl AssetStatistics {
  /// Wrap externally estimated statistics.
  ///
  /// The covariance must be square, finite and symmetric up to rounding; it
  /// is stored exactly symmetric.
  pub fn new(
    tickers: Vec<String>,
    mean_returns: Array1<f64>,
    covariance: Array2<f64>,
  ) -> Result<Self> {
    let n = tickers.len();
    if n == 0 {
      return Err(PortfolioError::InvalidInput(
        "statistics need at least one asset".to_string(),
      ));
    }
    if mean_returns.len() != n {
      return Err(PortfolioError::DimensionMismatch {
        expected: n,
        actual: mean_returns.len(),
      });
    }
    if covariance.nrows() != n || covariance.ncols() != n {
      return Err(PortfolioError::DimensionMismatch {
        expected: n,
        actual: if covariance.nrows() != n {
          covariance.nrows()
        } else {
          covariance.ncols()
        },
      });
    }
    if mean_returns.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
      return Err(PortfolioError::InvalidInput(
        "statistics must be finite".to_string(),
      ));
    }
    for i in 0..n {
      for j in (i + 1)..n {
        let (a, b) = (covariance[[i, j]], covariance[[j, i]]);
        if (a - b).abs() > 1e-10 * a.abs().max(b.abs()).max(1.0) {
          return Err(PortfolioError::InvalidInput(format!(
            "covariance is not symmetric at ({i}, {j})"
          )));
        }
      }
    }

    Ok(Self {
      tickers,
      mean_returns,
      covariance: symmetrize(covariance),
    })
  }

  /// Estimate annualized statistics from a return series.
  pub fn from_returns(returns: &ReturnSeries, periods_per_year: f64) -> Result<Self> {
    if !(periods_per_year.is_finite() && periods_per_year > 0.0) {
      return Err(PortfolioError::InvalidInput(format!(
        "periods per year must be positive, got {periods_per_year}"
      )));
    }

    let insufficient = PortfolioError::InsufficientData {
      observations: returns.len(),
      required: 2,
    };
    if returns.len() < 2 {
      return Err(insufficient);
    }

    let mean = returns
      .values
      .mean_axis(Axis(0))
      .ok_or_else(|| insufficient.clone())?;
    let cov = returns
      .values
      .t()
      .cov(1.0)
      .map_err(|_| insufficient.clone())?;

    Ok(Self {
      tickers: returns.tickers.clone(),
      mean_returns: mean * periods_per_year,
      covariance: symmetrize(cov * periods_per_year),
    })
  }

  pub fn tickers(&self) -> &[String] {
    &self.tickers
  }

  /// Annualized expected return per asset.
  pub fn mean_returns(&self) -> &Array1<f64> {
    &self.mean_returns
  }

  /// Annualized covariance matrix.
  pub fn covariance(&self) -> &Array2<f64> {
    &self.covariance
  }

  /// Number of assets.
  pub fn len(&self) -> usize {
    self.mean_returns.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Largest individual expected return.
  pub fn max_return(&self) -> f64 {
    self.mean_returns.max().copied().unwrap_or(f64::NAN)
  }

  /// Annualized volatility per asset.
  pub fn volatilities(&self) -> Array1<f64> {
    self.covariance.diag().mapv(|v| v.max(0.0).sqrt())
  }

  /// Pearson correlation matrix implied by the covariance.
  pub fn correlation(&self) -> Array2<f64> {
    let sd = self.volatilities();
    let n = self.len();

    Array2::from_shape_fn((n, n), |(i, j)| {
      if i == j {
        return 1.0;
      }
      let denom = sd[i] * sd[j];
      if denom > 1e-15 {
        (self.covariance[[i, j]] / denom).clamp(-1.0, 1.0)
      } else {
        0.0
      }
    })
  }
}

/// Annualized statistics of a price table.
///
/// Fails with [`PortfolioError::InsufficientData`] when fewer than two price
/// rows, or fewer than two return rows after differencing, are available.
pub fn compute_statistics(prices: &PriceTable, periods_per_year: f64) -> Result<AssetStatistics> {
  if prices.len() < 2 {
    return Err(PortfolioError::InsufficientData {
      observations: prices.len(),
      required: 2,
    });
  }

  let returns = prices.simple_returns()?;
  AssetStatistics::from_returns(&returns, periods_per_year)
}

fn symmetrize(m: Array2<f64>) -> Array2<f64> {
  let t = m.t().to_owned();
  (m + t) * 0.5
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use chrono::Days;
  use ndarray::array;
  use tracing_test::traced_test;

  use super::*;

  fn dates(n: usize) -> Vec<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    (0..n)
      .map(|i| start.checked_add_days(Days::new(i as u64)).unwrap())
      .collect()
  }

  fn tickers(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
  }

  fn sample_table() -> PriceTable {
    PriceTable::new(
      tickers(&["AAA", "BBB"]),
      dates(4),
      array![[100.0, 50.0], [110.0, 55.0], [99.0, 66.0], [108.9, 59.4]],
    )
    .unwrap()
  }

  #[test]
  fn simple_returns_drop_first_row() {
    let returns = sample_table().simple_returns().unwrap();

    assert_eq!(returns.len(), 3);
    assert_eq!(returns.dates()[0], dates(4)[1]);
    let expected = array![[0.1, 0.1], [-0.1, 0.2], [0.1, -0.1]];
    for (r, e) in returns.values().iter().zip(expected.iter()) {
      assert_abs_diff_eq!(r, e, epsilon = 1e-12);
    }
  }

  #[test]
  fn statistics_are_annualized_sample_moments() {
    let stats = compute_statistics(&sample_table(), TRADING_DAYS_PER_YEAR).unwrap();

    let a = [0.1, -0.1, 0.1];
    let b = [0.1, 0.2, -0.1];
    let ma = a.iter().sum::<f64>() / 3.0;
    let mb = b.iter().sum::<f64>() / 3.0;
    let var_a = a.iter().map(|x| (x - ma).powi(2)).sum::<f64>() / 2.0;
    let cov_ab = a
      .iter()
      .zip(b.iter())
      .map(|(x, y)| (x - ma) * (y - mb))
      .sum::<f64>()
      / 2.0;

    assert_abs_diff_eq!(stats.mean_returns()[0], ma * 252.0, epsilon = 1e-10);
    assert_abs_diff_eq!(stats.mean_returns()[1], mb * 252.0, epsilon = 1e-10);
    assert_abs_diff_eq!(stats.covariance()[[0, 0]], var_a * 252.0, epsilon = 1e-10);
    assert_abs_diff_eq!(stats.covariance()[[0, 1]], cov_ab * 252.0, epsilon = 1e-10);
    assert_eq!(stats.covariance()[[0, 1]], stats.covariance()[[1, 0]]);
    assert_abs_diff_eq!(
      stats.volatilities()[0],
      (var_a * 252.0).sqrt(),
      epsilon = 1e-12
    );
  }

  #[test]
  fn too_few_rows_is_insufficient_data() {
    let one_row = PriceTable::new(tickers(&["AAA"]), dates(1), array![[10.0]]).unwrap();
    assert_eq!(
      compute_statistics(&one_row, TRADING_DAYS_PER_YEAR),
      Err(PortfolioError::InsufficientData {
        observations: 1,
        required: 2
      })
    );

    let two_rows = PriceTable::new(tickers(&["AAA"]), dates(2), array![[10.0], [11.0]]).unwrap();
    assert_eq!(
      compute_statistics(&two_rows, TRADING_DAYS_PER_YEAR),
      Err(PortfolioError::InsufficientData {
        observations: 1,
        required: 2
      })
    );
  }

  #[test]
  fn price_table_rejects_non_positive_prices() {
    let err = PriceTable::new(tickers(&["AAA"]), dates(2), array![[10.0], [0.0]]).unwrap_err();
    assert!(matches!(err, PortfolioError::InvalidInput(_)));

    let err = PriceTable::new(tickers(&["AAA", "BBB"]), dates(2), array![[10.0], [11.0]])
      .unwrap_err();
    assert_eq!(
      err,
      PortfolioError::DimensionMismatch {
        expected: 2,
        actual: 1
      }
    );
  }

  #[test]
  #[traced_test]
  fn from_columns_drops_empty_tickers_and_partial_rows() {
    let table = PriceTable::from_columns(
      dates(4),
      vec![
        ("XOM".to_string(), vec![Some(100.0), Some(101.0), None, Some(103.0)]),
        ("PXD".to_string(), vec![None, None, None, None]),
        (
          "CVX".to_string(),
          vec![Some(150.0), Some(f64::NAN), Some(152.0), Some(151.0)],
        ),
      ],
    )
    .unwrap();

    assert_eq!(table.tickers(), &tickers(&["XOM", "CVX"])[..]);
    assert_eq!(table.len(), 2);
    assert_eq!(table.dates(), &[dates(4)[0], dates(4)[3]][..]);
    assert_eq!(table.prices(), &array![[100.0, 150.0], [103.0, 151.0]]);
    assert!(logs_contain("dropping ticker with no price data"));
  }

  #[test]
  fn from_columns_fails_when_every_ticker_is_empty() {
    let err = PriceTable::from_columns(dates(2), vec![("PXD".to_string(), vec![None, None])])
      .unwrap_err();
    assert!(matches!(err, PortfolioError::InvalidInput(_)));
  }

  #[test]
  fn normalized_prices_start_at_base() {
    let normalized = sample_table().normalized(100.0);
    assert_abs_diff_eq!(normalized[[0, 0]], 100.0, epsilon = 1e-12);
    assert_abs_diff_eq!(normalized[[0, 1]], 100.0, epsilon = 1e-12);
    assert_abs_diff_eq!(normalized[[2, 1]], 132.0, epsilon = 1e-9);
  }

  #[test]
  fn correlation_has_unit_diagonal() {
    let stats = AssetStatistics::new(
      tickers(&["A", "B"]),
      array![0.1, 0.15],
      array![[0.04, -0.06], [-0.06, 0.09]],
    )
    .unwrap();
    let corr = stats.correlation();

    assert_eq!(corr[[0, 0]], 1.0);
    assert_eq!(corr[[1, 1]], 1.0);
    assert_abs_diff_eq!(corr[[0, 1]], -1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(stats.max_return(), 0.15);
  }

  #[test]
  fn statistics_reject_asymmetric_covariance() {
    let err = AssetStatistics::new(
      tickers(&["A", "B"]),
      array![0.1, 0.15],
      array![[0.04, 0.01], [0.02, 0.09]],
    )
    .unwrap_err();
    assert!(matches!(err, PortfolioError::InvalidInput(_)));
  }
}
